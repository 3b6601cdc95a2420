pub mod backend;
pub mod cmap;
pub mod fonts;
pub mod text;
