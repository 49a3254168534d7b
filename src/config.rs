//! Configuration file support.
//!
//! Loads settings from ~/.config/mosaicwm/config.toml if it exists,
//! otherwise uses defaults good enough to run with no file at all.
//! A parse failure is never fatal: the previous (or default) snapshot
//! stays in effect and the error is logged.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::layout::LayoutKind;
use crate::types::{Direction, MAX_WORKSPACES};

/// Top-level configuration
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log filter applied at startup: error, warn, info, debug, trace.
    pub log_level: String,
    /// Workspace names, one bit each; at most 31 are usable.
    pub workspaces: Vec<String>,
    /// Commands spawned once when the window manager starts.
    pub startup: Vec<String>,
    pub gaps: GapsConfig,
    pub border: BorderConfig,
    pub layout: LayoutSection,
    pub windows: WindowsConfig,
    pub dash: DashConfig,
    /// Key chord -> action table, e.g. `[keybindings."Mod4+Return"]`.
    pub keybindings: HashMap<String, KeyBindingEntry>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GapsConfig {
    pub outer: u32,
    pub inner: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BorderConfig {
    pub width: u32,
    pub active_color: String,
    pub inactive_color: String,
    pub urgent_color: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LayoutSection {
    /// tile, monocle, dwindle, dwindlegaps or floating
    pub default: String,
    pub master_factor: f32,
    pub num_master: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WindowsConfig {
    /// Focus a window as soon as it is mapped.
    pub focus_new_windows: bool,
    /// Warp the pointer to the window that takes focus.
    pub move_cursor_with_focus: bool,
    /// Refuse focus cycling away from a fullscreen window.
    pub lock_fullscreen: bool,
    /// Edge snap distance for floating drags, in pixels.
    pub snap: u32,
    /// Drag motion samples are throttled to this rate (Hz).
    pub refresh_rate: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashConfig {
    pub show: bool,
    pub height: u32,
}

/// One keybinding table entry
#[derive(Debug, Deserialize, Clone)]
pub struct KeyBindingEntry {
    pub action: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
}

/// Window manager action, fully resolved
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Spawn(String),
    KillClient,
    CycleFocus(bool),
    CycleLayout,
    SetLayout(LayoutKind),
    IncMaster(i32),
    AdjustMasterFactor(f32),
    Zoom,
    ToggleFloating,
    ToggleFullscreen,
    ToggleDash,
    /// Workspace index into the configured name list.
    ViewWorkspace(usize),
    MoveToWorkspace(usize),
    DuplicateToWorkspace(usize),
    ToggleWorkspace(usize),
    FocusMonitor(Direction),
    MoveToMonitor(Direction),
    Reload,
    Quit,
}

/// A keybinding ready for X11 grab
#[derive(Debug, Clone)]
pub struct Keybinding {
    pub keysym: u32,
    pub modifiers: u16,
    pub action: Action,
}

impl Config {
    /// Default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mosaicwm")
            .join("config.toml")
    }

    /// Parse the config file at `path`. `Ok(None)` when the file does
    /// not exist; a parse failure is an error so callers decide what
    /// snapshot stays in effect. Logs nothing, so it is safe to call
    /// before the logger is up.
    pub fn try_load_from_path(path: &Path) -> anyhow::Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(Some(toml::from_str(&contents)?)),
            Err(_) => Ok(None),
        }
    }

    /// Workspace names, truncated to the usable bit count.
    pub fn workspace_names(&self) -> &[String] {
        if self.workspaces.len() > MAX_WORKSPACES {
            log::warn!(
                "{} workspaces configured, only the first {} are usable",
                self.workspaces.len(),
                MAX_WORKSPACES
            );
            &self.workspaces[..MAX_WORKSPACES]
        } else {
            &self.workspaces
        }
    }

    pub fn default_layout(&self) -> LayoutKind {
        match LayoutKind::parse(&self.layout.default) {
            Some(l) => l,
            None => {
                log::warn!("Unknown layout {:?}, falling back to tile", self.layout.default);
                LayoutKind::Tile
            }
        }
    }

    pub fn master_factor(&self) -> f32 {
        self.layout.master_factor.clamp(0.05, 0.95)
    }

    pub fn active_border_pixel(&self) -> u32 {
        parse_color(&self.border.active_color).unwrap_or(0x5294e2)
    }

    pub fn inactive_border_pixel(&self) -> u32 {
        parse_color(&self.border.inactive_color).unwrap_or(0x3a3a3a)
    }

    pub fn urgent_border_pixel(&self) -> u32 {
        parse_color(&self.border.urgent_color).unwrap_or(0xd19a66)
    }

    /// Minimum interval between accepted drag motion samples.
    pub fn refresh_interval(&self) -> std::time::Duration {
        let hz = self.windows.refresh_rate.max(1);
        std::time::Duration::from_millis(1000 / hz as u64)
    }

    /// Parse the keybinding table. Malformed entries are skipped one by
    /// one so a single typo never takes down the whole table.
    pub fn parse_keybindings(&self) -> Vec<Keybinding> {
        let mut bindings = Vec::new();
        for (chord, entry) in &self.keybindings {
            let Some((keysym, modifiers)) = parse_key_binding(chord) else {
                log::error!("Skipping keybinding with bad chord: {}", chord);
                continue;
            };
            match self.parse_action(&entry.action, entry.value.as_deref()) {
                Some(action) => bindings.push(Keybinding {
                    keysym,
                    modifiers,
                    action,
                }),
                None => {
                    log::error!(
                        "Skipping keybinding {:?}: unknown action {:?} (value {:?})",
                        chord,
                        entry.action,
                        entry.value
                    );
                }
            }
        }
        bindings
    }

    /// Resolve an action name and optional value.
    pub fn parse_action(&self, action: &str, value: Option<&str>) -> Option<Action> {
        match action {
            "spawn" => value.map(|v| Action::Spawn(v.to_string())),
            "killclient" | "kill" => Some(Action::KillClient),
            "cyclefocus" => Some(Action::CycleFocus(value != Some("prev"))),
            "cyclelayout" => Some(Action::CycleLayout),
            "setlayout" => LayoutKind::parse(value?).map(Action::SetLayout),
            "incmaster" => value?.parse().ok().map(Action::IncMaster),
            "setmasterfactor" => value?.parse().ok().map(Action::AdjustMasterFactor),
            "zoom" => Some(Action::Zoom),
            "togglefloating" => Some(Action::ToggleFloating),
            "togglefullscreen" => Some(Action::ToggleFullscreen),
            "toggledash" => Some(Action::ToggleDash),
            "viewworkspace" => self.workspace_index(value?).map(Action::ViewWorkspace),
            "movetoworkspace" => self.workspace_index(value?).map(Action::MoveToWorkspace),
            "duplicatetoworkspace" => self
                .workspace_index(value?)
                .map(Action::DuplicateToWorkspace),
            "toggleworkspace" => self.workspace_index(value?).map(Action::ToggleWorkspace),
            "focusmonitor" => Direction::parse(value?).map(Action::FocusMonitor),
            "movetomonitor" => Direction::parse(value?).map(Action::MoveToMonitor),
            "reload" => Some(Action::Reload),
            "quit" => Some(Action::Quit),
            _ => None,
        }
    }

    /// Accept a workspace by name or 1-based position.
    fn workspace_index(&self, value: &str) -> Option<usize> {
        let names = self.workspace_names();
        if let Some(i) = names.iter().position(|n| n == value) {
            return Some(i);
        }
        match value.parse::<usize>() {
            Ok(n) if n >= 1 && n <= names.len() => Some(n - 1),
            _ => None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            workspaces: (1..=9).map(|i| i.to_string()).collect(),
            startup: Vec::new(),
            gaps: GapsConfig::default(),
            border: BorderConfig::default(),
            layout: LayoutSection::default(),
            windows: WindowsConfig::default(),
            dash: DashConfig::default(),
            keybindings: default_keybindings(),
        }
    }
}

impl Default for GapsConfig {
    fn default() -> Self {
        Self { outer: 10, inner: 5 }
    }
}

impl Default for BorderConfig {
    fn default() -> Self {
        Self {
            width: 2,
            active_color: "#5294e2".to_string(),
            inactive_color: "#3a3a3a".to_string(),
            urgent_color: "#d19a66".to_string(),
        }
    }
}

impl Default for LayoutSection {
    fn default() -> Self {
        Self {
            default: "tile".to_string(),
            master_factor: 0.55,
            num_master: 1,
        }
    }
}

impl Default for WindowsConfig {
    fn default() -> Self {
        Self {
            focus_new_windows: true,
            move_cursor_with_focus: false,
            lock_fullscreen: true,
            snap: 16,
            refresh_rate: 60,
        }
    }
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            show: true,
            height: 24,
        }
    }
}

fn entry(action: &str, value: Option<&str>) -> KeyBindingEntry {
    KeyBindingEntry {
        action: action.to_string(),
        value: value.map(|v| v.to_string()),
        desc: None,
    }
}

fn default_keybindings() -> HashMap<String, KeyBindingEntry> {
    let mut b = HashMap::new();
    b.insert("Mod4+Return".to_string(), entry("spawn", Some("alacritty")));
    b.insert("Mod4+p".to_string(), entry("spawn", Some("dmenu_run")));
    b.insert("Mod4+j".to_string(), entry("cyclefocus", Some("next")));
    b.insert("Mod4+k".to_string(), entry("cyclefocus", Some("prev")));
    b.insert("Mod4+h".to_string(), entry("setmasterfactor", Some("-0.05")));
    b.insert("Mod4+l".to_string(), entry("setmasterfactor", Some("0.05")));
    b.insert("Mod4+i".to_string(), entry("incmaster", Some("1")));
    b.insert("Mod4+d".to_string(), entry("incmaster", Some("-1")));
    b.insert("Mod4+q".to_string(), entry("killclient", None));
    b.insert("Mod4+Shift+Return".to_string(), entry("zoom", None));
    b.insert("Mod4+space".to_string(), entry("cyclelayout", None));
    b.insert("Mod4+t".to_string(), entry("setlayout", Some("tile")));
    b.insert("Mod4+m".to_string(), entry("setlayout", Some("monocle")));
    b.insert("Mod4+w".to_string(), entry("setlayout", Some("dwindlegaps")));
    b.insert(
        "Mod4+Shift+space".to_string(),
        entry("togglefloating", None),
    );
    b.insert("Mod4+f".to_string(), entry("togglefullscreen", None));
    b.insert("Mod4+b".to_string(), entry("toggledash", None));
    for i in 1..=9u32 {
        let ws = i.to_string();
        b.insert(
            format!("Mod4+{}", i),
            entry("viewworkspace", Some(&ws)),
        );
        b.insert(
            format!("Mod4+Shift+{}", i),
            entry("movetoworkspace", Some(&ws)),
        );
        b.insert(
            format!("Mod4+Control+{}", i),
            entry("toggleworkspace", Some(&ws)),
        );
        b.insert(
            format!("Mod4+Control+Shift+{}", i),
            entry("duplicatetoworkspace", Some(&ws)),
        );
    }
    b.insert("Mod4+comma".to_string(), entry("focusmonitor", Some("prev")));
    b.insert(
        "Mod4+period".to_string(),
        entry("focusmonitor", Some("next")),
    );
    b.insert(
        "Mod4+Shift+comma".to_string(),
        entry("movetomonitor", Some("prev")),
    );
    b.insert(
        "Mod4+Shift+period".to_string(),
        entry("movetomonitor", Some("next")),
    );
    b.insert("Mod4+Shift+r".to_string(), entry("reload", None));
    b.insert("Mod4+Shift+q".to_string(), entry("quit", None));
    b
}

/// Parse a key chord like "Mod4+Shift+h" into keysym and modifiers
pub fn parse_key_binding(s: &str) -> Option<(u32, u16)> {
    let parts: Vec<&str> = s.split('+').collect();
    if parts.is_empty() {
        return None;
    }

    let mut modifiers: u16 = 0;
    let key_part = parts.last()?;

    // X11 modifier masks
    const SHIFT_MASK: u16 = 1;
    const CONTROL_MASK: u16 = 4;
    const MOD1_MASK: u16 = 8; // Alt
    const MOD4_MASK: u16 = 64; // Super/Win

    for part in &parts[..parts.len() - 1] {
        match part.to_lowercase().as_str() {
            "mod4" | "super" | "win" => modifiers |= MOD4_MASK,
            "shift" => modifiers |= SHIFT_MASK,
            "control" | "ctrl" => modifiers |= CONTROL_MASK,
            "mod1" | "alt" => modifiers |= MOD1_MASK,
            _ => {
                log::warn!("Unknown modifier: {}", part);
            }
        }
    }

    let keysym = key_to_keysym(key_part)?;
    Some((keysym, modifiers))
}

/// Convert key name to X11 keysym
fn key_to_keysym(key: &str) -> Option<u32> {
    match key.to_lowercase().as_str() {
        "return" | "enter" => Some(0xff0d),
        "tab" => Some(0xff09),
        "escape" | "esc" => Some(0xff1b),
        "space" => Some(0x20),
        "backspace" => Some(0xff08),
        "delete" => Some(0xffff),
        "a" => Some(0x61),
        "b" => Some(0x62),
        "c" => Some(0x63),
        "d" => Some(0x64),
        "e" => Some(0x65),
        "f" => Some(0x66),
        "g" => Some(0x67),
        "h" => Some(0x68),
        "i" => Some(0x69),
        "j" => Some(0x6a),
        "k" => Some(0x6b),
        "l" => Some(0x6c),
        "m" => Some(0x6d),
        "n" => Some(0x6e),
        "o" => Some(0x6f),
        "p" => Some(0x70),
        "q" => Some(0x71),
        "r" => Some(0x72),
        "s" => Some(0x73),
        "t" => Some(0x74),
        "u" => Some(0x75),
        "v" => Some(0x76),
        "w" => Some(0x77),
        "x" => Some(0x78),
        "y" => Some(0x79),
        "z" => Some(0x7a),
        "1" => Some(0x31),
        "2" => Some(0x32),
        "3" => Some(0x33),
        "4" => Some(0x34),
        "5" => Some(0x35),
        "6" => Some(0x36),
        "7" => Some(0x37),
        "8" => Some(0x38),
        "9" => Some(0x39),
        "0" => Some(0x30),
        // Function/navigation keys
        "page_up" | "pageup" | "pgup" | "prior" => Some(0xff55),
        "page_down" | "pagedown" | "pgdn" => Some(0xff56),
        "left" => Some(0xff51),
        "up" => Some(0xff52),
        "right" => Some(0xff53),
        "down" => Some(0xff54),
        "home" => Some(0xff50),
        "end" => Some(0xff57),
        // Function keys F1-F12
        "f1" => Some(0xffbe),
        "f2" => Some(0xffbf),
        "f3" => Some(0xffc0),
        "f4" => Some(0xffc1),
        "f5" => Some(0xffc2),
        "f6" => Some(0xffc3),
        "f7" => Some(0xffc4),
        "f8" => Some(0xffc5),
        "f9" => Some(0xffc6),
        "f10" => Some(0xffc7),
        "f11" => Some(0xffc8),
        "f12" => Some(0xffc9),
        // Punctuation
        "," | "comma" => Some(0x2c),
        "." | "period" => Some(0x2e),
        "[" | "bracketleft" => Some(0x5b),
        "]" | "bracketright" => Some(0x5d),
        "/" | "slash" => Some(0x2f),
        _ => {
            log::warn!("Unknown key: {}", key);
            None
        }
    }
}

/// Parse hex color string (e.g., "#5294e2" or "5294e2") to u32
pub fn parse_color(s: &str) -> Option<u32> {
    let s = s.trim_start_matches('#');
    u32::from_str_radix(s, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_binding() {
        let (keysym, modifiers) = parse_key_binding("Mod4+Return").unwrap();
        assert_eq!(keysym, 0xff0d);
        assert_eq!(modifiers, 64); // Mod4

        let (keysym, modifiers) = parse_key_binding("Mod4+Shift+q").unwrap();
        assert_eq!(keysym, 0x71);
        assert_eq!(modifiers, 64 | 1); // Mod4 + Shift

        let (keysym, modifiers) = parse_key_binding("Mod4+Control+h").unwrap();
        assert_eq!(keysym, 0x68);
        assert_eq!(modifiers, 64 | 4); // Mod4 + Control
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#5294e2"), Some(0x5294e2));
        assert_eq!(parse_color("5294e2"), Some(0x5294e2));
        assert_eq!(parse_color("ffffff"), Some(0xffffff));
        assert_eq!(parse_color("not a color"), None);
    }

    #[test]
    fn test_key_to_keysym() {
        assert_eq!(key_to_keysym("return"), Some(0xff0d));
        assert_eq!(key_to_keysym("Return"), Some(0xff0d));
        assert_eq!(key_to_keysym("tab"), Some(0xff09));
        assert_eq!(key_to_keysym("h"), Some(0x68));
        assert_eq!(key_to_keysym("1"), Some(0x31));
        assert_eq!(key_to_keysym("comma"), Some(0x2c));
    }

    #[test]
    fn test_default_keybindings_resolve() {
        let config = Config::default();
        let bindings = config.parse_keybindings();
        assert!(bindings
            .iter()
            .any(|b| b.action == Action::Spawn("alacritty".to_string())));
        assert!(bindings.iter().any(|b| b.action == Action::Quit));
        assert!(bindings.iter().any(|b| b.action == Action::ViewWorkspace(8)));
        assert!(bindings
            .iter()
            .any(|b| b.action == Action::FocusMonitor(Direction::Next)));
    }

    #[test]
    fn test_keybinding_table_from_toml() {
        let toml = r#"
workspaces = ["term", "web", "mail"]

[keybindings."Mod4+Return"]
action = "spawn"
value = "xterm"
desc = "launch a terminal"

[keybindings."Mod4+w"]
action = "viewworkspace"
value = "web"

[keybindings."Mod4+o"]
action = "frobnicate"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let bindings = config.parse_keybindings();
        // The bogus action is dropped, the other two survive.
        assert_eq!(bindings.len(), 2);
        assert!(bindings
            .iter()
            .any(|b| b.action == Action::Spawn("xterm".to_string())));
        assert!(bindings.iter().any(|b| b.action == Action::ViewWorkspace(1)));
    }

    #[test]
    fn test_workspace_index_by_name_and_number() {
        let mut config = Config::default();
        config.workspaces = vec!["term".into(), "web".into()];
        assert_eq!(config.workspace_index("web"), Some(1));
        assert_eq!(config.workspace_index("1"), Some(0));
        assert_eq!(config.workspace_index("3"), None);
        assert_eq!(config.workspace_index("nope"), None);
    }

    #[test]
    fn test_workspace_list_is_truncated() {
        let mut config = Config::default();
        config.workspaces = (0..40).map(|i| i.to_string()).collect();
        assert_eq!(config.workspace_names().len(), MAX_WORKSPACES);
    }

    #[test]
    fn test_action_parsing() {
        let config = Config::default();
        assert_eq!(
            config.parse_action("cyclefocus", Some("prev")),
            Some(Action::CycleFocus(false))
        );
        assert_eq!(
            config.parse_action("setlayout", Some("monocle")),
            Some(Action::SetLayout(LayoutKind::Monocle))
        );
        assert_eq!(
            config.parse_action("incmaster", Some("-1")),
            Some(Action::IncMaster(-1))
        );
        assert_eq!(config.parse_action("spawn", None), None);
        assert_eq!(config.parse_action("warp-to-mars", None), None);
    }

    #[test]
    fn test_master_factor_is_clamped() {
        let mut config = Config::default();
        config.layout.master_factor = 1.7;
        assert!((config.master_factor() - 0.95).abs() < f32::EPSILON);
        config.layout.master_factor = -0.3;
        assert!((config.master_factor() - 0.05).abs() < f32::EPSILON);
    }

    #[test]
    fn test_defaults_without_file() {
        let loaded = Config::try_load_from_path(Path::new("/nonexistent/config.toml")).unwrap();
        assert!(loaded.is_none());
        let config = Config::default();
        assert_eq!(config.workspaces.len(), 9);
        assert_eq!(config.default_layout(), LayoutKind::Tile);
        assert!(config.dash.show);
    }

    #[test]
    fn test_malformed_file_is_an_error_not_defaults() {
        let path = std::env::temp_dir().join(format!(
            "mosaicwm-config-test-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "workspaces = [\"term\", oops").unwrap();
        // Callers must see the failure so a running snapshot survives.
        assert!(Config::try_load_from_path(&path).is_err());
        std::fs::remove_file(&path).unwrap();
    }
}
