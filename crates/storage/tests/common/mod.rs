pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{TestBackend, all_backends, token};
