use std::sync::Arc;

use crate::types::{SurfaceOrigin, Swizzle};

use super::TextureProxy;

/// A proxy seen through an origin and a channel swizzle.
///
/// Views are cheap to clone; every clone holds its own reference to the
/// proxy, so read and write views of one surface share a single proxy.
#[derive(Debug, Clone)]
pub struct SurfaceProxyView {
    proxy: Arc<TextureProxy>,
    origin: SurfaceOrigin,
    swizzle: Swizzle,
}

impl SurfaceProxyView {
    pub fn new(proxy: Arc<TextureProxy>, origin: SurfaceOrigin, swizzle: Swizzle) -> Self {
        Self {
            proxy,
            origin,
            swizzle,
        }
    }

    pub fn proxy(&self) -> &Arc<TextureProxy> {
        &self.proxy
    }

    pub fn origin(&self) -> SurfaceOrigin {
        self.origin
    }

    pub fn swizzle(&self) -> Swizzle {
        self.swizzle
    }

    pub fn width(&self) -> u32 {
        self.proxy.width()
    }

    pub fn height(&self) -> u32 {
        self.proxy.height()
    }

    /// Apply `swizzle` after this view's swizzle.
    pub fn concat_swizzle(&mut self, swizzle: Swizzle) {
        self.swizzle = self.swizzle.concat(swizzle);
    }

    /// Give up the view, returning its proxy reference.
    pub fn detach_proxy(self) -> Arc<TextureProxy> {
        self.proxy
    }
}
