//! Slide property map and well-known key names.
//!
//! Properties are an ordered mapping of UTF-8 name to UTF-8 value with
//! unique keys. Vendors insert their raw `<vendor>.*` metadata plus the
//! standard `openslide.*` keys; the map is frozen (and key-sorted) when the
//! slide finishes opening.

use indexmap::IndexMap;

/// Standard property key names.
pub mod keys {
    /// Name of the vendor that claimed the slide.
    pub const VENDOR: &str = "openslide.vendor";

    /// Stable per-slide digest, lowercase hex.
    pub const QUICKHASH_1: &str = "openslide.quickhash-1";

    /// Slide background color as 6 hex digits; absence means white.
    pub const BACKGROUND_COLOR: &str = "openslide.background-color";

    /// Microns per pixel in X at level 0.
    pub const MPP_X: &str = "openslide.mpp-x";

    /// Microns per pixel in Y at level 0.
    pub const MPP_Y: &str = "openslide.mpp-y";

    /// Magnification power of the objective.
    pub const OBJECTIVE_POWER: &str = "openslide.objective-power";

    /// Free-form comment from the file.
    pub const COMMENT: &str = "openslide.comment";

    /// Number of pyramid levels.
    pub const LEVEL_COUNT: &str = "openslide.level-count";

    /// `openslide.level[i].width`
    pub fn level_width(i: usize) -> String {
        format!("openslide.level[{i}].width")
    }

    /// `openslide.level[i].height`
    pub fn level_height(i: usize) -> String {
        format!("openslide.level[{i}].height")
    }

    /// `openslide.level[i].downsample`
    pub fn level_downsample(i: usize) -> String {
        format!("openslide.level[{i}].downsample")
    }

    /// `openslide.level[i].tile-width`
    pub fn level_tile_width(i: usize) -> String {
        format!("openslide.level[{i}].tile-width")
    }

    /// `openslide.level[i].tile-height`
    pub fn level_tile_height(i: usize) -> String {
        format!("openslide.level[{i}].tile-height")
    }
}

/// Ordered mapping of property name to value.
#[derive(Debug, Clone, Default)]
pub struct PropertyMap {
    map: IndexMap<String, String>,
}

impl PropertyMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property, replacing any existing value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.map.insert(name.into(), value.into());
    }

    /// Set a property when the value is present; absent values set nothing.
    pub fn set_opt(&mut self, name: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.map.insert(name.to_string(), value.to_string());
        }
    }

    /// Look up a property value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }

    /// Remove a property, returning its old value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.map.shift_remove(name)
    }

    /// Copy the integer value of `src` to `dst`, when it parses as a number.
    ///
    /// The fractional part is truncated; a non-numeric source sets nothing.
    pub fn duplicate_int(&mut self, src: &str, dst: &str) {
        if let Some(value) = self.get(src) {
            if let Ok(number) = value.trim().parse::<f64>() {
                if number.is_finite() {
                    self.set(dst, format!("{}", number.trunc() as i64));
                }
            }
        }
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True when no properties are set.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate `(name, value)` pairs in map order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Sort keys lexicographically; called once when open finishes.
    pub fn sort_keys(&mut self) {
        self.map.sort_keys();
    }
}
