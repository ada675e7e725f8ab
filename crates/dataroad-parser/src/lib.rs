pub mod errors;
pub mod model;
mod reader;
mod sniff;

pub use errors::{ParserError, RowIssue};
pub use model::{Delimiter, ParsedTable, RowPolicy, TextEncoding};
pub use reader::{decode_text, read_delimited};
pub use sniff::sniff_delimiter;
