pub mod caption;
pub mod document;
pub mod font;
pub mod grid;
pub mod sheet;

pub use caption::*;
pub use document::*;
pub use font::*;
pub use grid::*;
pub use sheet::*;
