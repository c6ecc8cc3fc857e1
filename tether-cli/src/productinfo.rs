//! Information about this project.

/// The formal name of this product.
pub const PRODUCT_NAME: &str = "tether";

/// The version of the product, in string form.
pub const PRODUCT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The URI to report issues against.
pub const PRODUCT_REPO: &str = env!("CARGO_PKG_REPOSITORY");
