//! Texture proxies.
//!
//! A [`TextureProxy`] stands in for a texture that is allocated lazily, at
//! flush time. Proxies are created by a [`ProxyProvider`], optionally keyed
//! for later lookup, and seen through [`SurfaceProxyView`]s.
//!
//! ```text
//! Virtual ──instantiate──> Instantiated ──release──> Released
//! ```

mod provider;
mod texture_proxy;
mod view;

pub use provider::ProxyProvider;
pub use texture_proxy::{ProxyStateKind, TextureProxy, loose_fit_size};
pub use view::SurfaceProxyView;
