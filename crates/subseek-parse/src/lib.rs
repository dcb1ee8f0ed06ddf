pub mod elements;
pub mod keyword;
pub mod parser;

pub use elements::MovieInfo;
pub use keyword::is_video_file;
pub use parser::{clean_search_query, extract_imdb_id, parse};
