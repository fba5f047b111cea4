#[cfg(not(feature = "loom"))]
mod acts_like_map;
#[cfg(feature = "loom")]
mod models;
