//! Periscope configuration
//!
//! TOML-backed configuration. Every table and field is optional; missing values
//! fall back to the defaults below.

use crate::error::{Error, Result};
use crate::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriscopeConfig {
    #[serde(default)]
    pub logging: LogConfig,
    #[serde(default)]
    pub writes: WritesConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub offsets: OffsetsConfig,
}

/// Memory write subsystem switches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WritesConfig {
    /// Global switch; nothing is written while false
    #[serde(default)]
    pub enabled: bool,
    /// Per-feature enablement keyed by feature name
    #[serde(default)]
    pub features: BTreeMap<String, bool>,
}

/// Camera acquisition timings and sanity bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Sleep between session checks while waiting for a session
    #[serde(default = "default_session_poll_ms")]
    pub session_poll_ms: u64,
    /// Delay after the session becomes active before the first search
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Sleep between checks while settling
    #[serde(default = "default_settle_poll_ms")]
    pub settle_poll_ms: u64,
    /// Retry interval for the first `fast_attempts` searches
    #[serde(default = "default_search_fast_ms")]
    pub search_fast_ms: u64,
    /// Retry interval once the fast attempts are used up
    #[serde(default = "default_search_slow_ms")]
    pub search_slow_ms: u64,
    #[serde(default = "default_fast_attempts")]
    pub fast_attempts: u32,
    /// Sleep between session checks once ready
    #[serde(default = "default_ready_poll_ms")]
    pub ready_poll_ms: u64,
    /// Sleep after an unexpected error in the loop
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    /// Camera list counts above this are treated as garbage
    #[serde(default = "default_max_list_count")]
    pub max_list_count: u32,
    /// Number of list entries inspected per attempt
    #[serde(default = "default_max_scan_entries")]
    pub max_scan_entries: u32,
    /// Shorter names are treated as uninitialized
    #[serde(default = "default_min_name_len")]
    pub min_name_len: usize,
    #[serde(default = "default_max_name_len")]
    pub max_name_len: usize,
    /// Absolute translation bound for a plausible in-world camera
    #[serde(default = "default_world_bound")]
    pub world_bound: f32,
    /// Minimum interval between verbose search log lines
    #[serde(default = "default_log_interval_ms")]
    pub log_interval_ms: u64,
}

fn default_session_poll_ms() -> u64 {
    500
}

fn default_settle_delay_ms() -> u64 {
    30_000
}

fn default_settle_poll_ms() -> u64 {
    250
}

fn default_search_fast_ms() -> u64 {
    500
}

fn default_search_slow_ms() -> u64 {
    1000
}

fn default_fast_attempts() -> u32 {
    10
}

fn default_ready_poll_ms() -> u64 {
    500
}

fn default_error_backoff_ms() -> u64 {
    1000
}

fn default_max_list_count() -> u32 {
    1024
}

fn default_max_scan_entries() -> u32 {
    100
}

fn default_min_name_len() -> usize {
    3
}

fn default_max_name_len() -> usize {
    64
}

fn default_world_bound() -> f32 {
    5000.0
}

fn default_log_interval_ms() -> u64 {
    5000
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            session_poll_ms: default_session_poll_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            settle_poll_ms: default_settle_poll_ms(),
            search_fast_ms: default_search_fast_ms(),
            search_slow_ms: default_search_slow_ms(),
            fast_attempts: default_fast_attempts(),
            ready_poll_ms: default_ready_poll_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            max_list_count: default_max_list_count(),
            max_scan_entries: default_max_scan_entries(),
            min_name_len: default_min_name_len(),
            max_name_len: default_max_name_len(),
            world_bound: default_world_bound(),
            log_interval_ms: default_log_interval_ms(),
        }
    }
}

impl CameraConfig {
    pub fn session_poll(&self) -> Duration {
        Duration::from_millis(self.session_poll_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn settle_poll(&self) -> Duration {
        Duration::from_millis(self.settle_poll_ms)
    }

    pub fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn log_interval(&self) -> Duration {
        Duration::from_millis(self.log_interval_ms)
    }

    /// Retry delay after search attempt number `attempt` (1-based)
    pub fn search_backoff(&self, attempt: u32) -> Duration {
        if attempt <= self.fast_attempts {
            Duration::from_millis(self.search_fast_ms)
        } else {
            Duration::from_millis(self.search_slow_ms)
        }
    }
}

/// Projection viewport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    /// Margin in pixels for "nearly visible" on-screen checks
    #[serde(default = "default_screen_tolerance")]
    pub screen_tolerance: f32,
}

fn default_viewport_width() -> u32 {
    1920
}

fn default_viewport_height() -> u32 {
    1080
}

fn default_screen_tolerance() -> f32 {
    800.0
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            screen_tolerance: default_screen_tolerance(),
        }
    }
}

/// Target structure layout
///
/// Offsets are external input. The defaults describe the simulated target
/// shipped with `periscope-core`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OffsetsConfig {
    #[serde(default)]
    pub camera: CameraOffsets,
    #[serde(default)]
    pub component: ComponentOffsets,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraOffsets {
    /// Engine base → pointer to the global camera list
    #[serde(default = "default_all_cameras")]
    pub all_cameras: u64,
    /// Camera list → pointer to the entry array
    #[serde(default)]
    pub list_items: u64,
    /// Camera list → i32 element count
    #[serde(default = "default_list_count")]
    pub list_count: u64,
    #[serde(default = "default_pointer_stride")]
    pub list_stride: u64,
    /// Camera component → owning game object
    #[serde(default = "default_component_game_object")]
    pub component_game_object: u64,
    /// Game object → name string pointer
    #[serde(default = "default_game_object_name")]
    pub game_object_name: u64,
    /// Camera → 4x4 view matrix
    #[serde(default = "default_view_matrix")]
    pub view_matrix: u64,
    /// Camera → f32 vertical field of view in degrees
    #[serde(default = "default_fov")]
    pub fov: u64,
    /// Camera → f32 aspect ratio
    #[serde(default = "default_aspect")]
    pub aspect: u64,
    /// Behaviour → bool "is added" (active) flag
    #[serde(default = "default_is_added")]
    pub is_added: u64,
}

fn default_all_cameras() -> u64 {
    0x1000
}

fn default_list_count() -> u64 {
    0x8
}

fn default_pointer_stride() -> u64 {
    0x8
}

fn default_component_game_object() -> u64 {
    0x30
}

fn default_game_object_name() -> u64 {
    0x60
}

fn default_view_matrix() -> u64 {
    0x100
}

fn default_fov() -> u64 {
    0x180
}

fn default_aspect() -> u64 {
    0x184
}

fn default_is_added() -> u64 {
    0x39
}

impl Default for CameraOffsets {
    fn default() -> Self {
        Self {
            all_cameras: default_all_cameras(),
            list_items: 0,
            list_count: default_list_count(),
            list_stride: default_pointer_stride(),
            component_game_object: default_component_game_object(),
            game_object_name: default_game_object_name(),
            view_matrix: default_view_matrix(),
            fov: default_fov(),
            aspect: default_aspect(),
            is_added: default_is_added(),
        }
    }
}

/// Game object component array layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentOffsets {
    /// Game object → component array base pointer
    #[serde(default = "default_components_array")]
    pub components_array: u64,
    /// Game object → u64 component count
    #[serde(default = "default_components_count")]
    pub components_count: u64,
    #[serde(default = "default_component_stride")]
    pub entry_stride: u64,
    /// Array entry → component pointer
    #[serde(default = "default_pointer_stride")]
    pub entry_component: u64,
    /// Component → object class (script instance)
    #[serde(default = "default_component_object_class")]
    pub component_object_class: u64,
    /// Pointer chain from object class to its class-name string
    #[serde(default = "default_class_name_chain")]
    pub class_name_chain: Vec<u64>,
}

fn default_components_array() -> u64 {
    0x40
}

fn default_components_count() -> u64 {
    0x48
}

fn default_component_stride() -> u64 {
    0x10
}

fn default_component_object_class() -> u64 {
    0x28
}

fn default_class_name_chain() -> Vec<u64> {
    vec![0x0, 0x10]
}

impl Default for ComponentOffsets {
    fn default() -> Self {
        Self {
            components_array: default_components_array(),
            components_count: default_components_count(),
            entry_stride: default_component_stride(),
            entry_component: default_pointer_stride(),
            component_object_class: default_component_object_class(),
            class_name_chain: default_class_name_chain(),
        }
    }
}

impl PeriscopeConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the camera and view code cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.camera.min_name_len > self.camera.max_name_len {
            return Err(Error::Config(format!(
                "camera.min_name_len ({}) exceeds camera.max_name_len ({})",
                self.camera.min_name_len, self.camera.max_name_len
            )));
        }
        if !(self.camera.world_bound.is_finite() && self.camera.world_bound > 0.0) {
            return Err(Error::Config(format!(
                "camera.world_bound must be positive, got {}",
                self.camera.world_bound
            )));
        }
        if self.offsets.camera.list_stride == 0 || self.offsets.component.entry_stride == 0 {
            return Err(Error::Config("list strides must be non-zero".into()));
        }
        if self.view.screen_tolerance < 0.0 {
            return Err(Error::Config("view.screen_tolerance must be >= 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PeriscopeConfig::default();
        assert!(!config.writes.enabled);
        assert_eq!(config.camera.settle_delay(), Duration::from_secs(30));
        assert_eq!(config.camera.max_list_count, 1024);
        assert_eq!(config.camera.max_scan_entries, 100);
        assert_eq!(config.view.viewport_width, 1920);
        assert_eq!(config.offsets.component.class_name_chain, vec![0x0, 0x10]);
    }

    #[test]
    fn test_search_backoff() {
        let camera = CameraConfig::default();
        assert_eq!(camera.search_backoff(1), Duration::from_millis(500));
        assert_eq!(camera.search_backoff(10), Duration::from_millis(500));
        assert_eq!(camera.search_backoff(11), Duration::from_millis(1000));
        assert_eq!(camera.search_backoff(250), Duration::from_millis(1000));
    }

    #[test]
    fn test_from_toml_partial() {
        let config = PeriscopeConfig::from_toml(
            r#"
            [writes]
            enabled = true
            features = { thermal = true, night = false }

            [camera]
            settle_delay_ms = 1000

            [offsets.camera]
            view_matrix = 0x128
            "#,
        )
        .unwrap();
        assert!(config.writes.enabled);
        assert_eq!(config.writes.features.get("thermal"), Some(&true));
        assert_eq!(config.camera.settle_delay_ms, 1000);
        assert_eq!(config.camera.session_poll_ms, 500);
        assert_eq!(config.offsets.camera.view_matrix, 0x128);
        assert_eq!(config.offsets.camera.fov, 0x180);
    }

    #[test]
    fn test_validate_rejects_inverted_name_bounds() {
        let err = PeriscopeConfig::from_toml(
            r#"
            [camera]
            min_name_len = 10
            max_name_len = 4
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_toml_roundtrip_preserves_config() {
        let mut config = PeriscopeConfig::default();
        config.writes.features.insert("thermal".into(), true);
        let text = config.to_toml().unwrap();
        assert_eq!(PeriscopeConfig::from_toml(&text).unwrap(), config);
    }
}
