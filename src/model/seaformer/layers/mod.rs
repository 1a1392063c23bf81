pub mod attention;
pub mod conv;
pub mod drop;
pub mod light_head;
pub mod mlp;
pub mod mobile;
pub mod transformer;
