//! Input normalization: raw keyboard / gamepad / focus events in, discrete
//! [`Command`]s and deadzone-clamped stick vectors out.

use crate::types::{Command, Direction, Stick, StickVector};
use crate::{BridgeError, Result};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Default analog deadzone.
pub const DEFAULT_DEADZONE: f32 = 0.1;

/// Named keys accepted in binding profiles besides single characters.
const NAMED_KEYS: &[&str] = &[
    "ArrowUp", "ArrowDown", "ArrowLeft", "ArrowRight", "Shift", "Ctrl", "Alt", "Meta", "Tab",
    "Enter", "Escape", "Backspace", "Delete", "Insert", "Home", "End", "PageUp", "PageDown",
    "CapsLock", "F1", "F2", "F3", "F4", "F5", "F6", "F7", "F8", "F9", "F10", "F11", "F12",
];

/// Logical action a profile binds to a physical input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    TiltLeft,
    TiltRight,
    MoveUpwards,
    MoveDownwards,
    CameraPitchUp,
    CameraPitchDown,
    CameraYawLeft,
    CameraYawRight,
    MoveForward,
    MoveBackward,
    Notes,
    Help,
}

impl Action {
    /// All actions, highest precedence first.
    pub const PRECEDENCE: [Action; 12] = [
        Action::TiltLeft,
        Action::TiltRight,
        Action::MoveUpwards,
        Action::MoveDownwards,
        Action::CameraPitchUp,
        Action::CameraPitchDown,
        Action::CameraYawLeft,
        Action::CameraYawRight,
        Action::MoveForward,
        Action::MoveBackward,
        Action::Notes,
        Action::Help,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Action::TiltLeft => "tiltLeft",
            Action::TiltRight => "tiltRight",
            Action::MoveUpwards => "moveUpwards",
            Action::MoveDownwards => "moveDownwards",
            Action::CameraPitchUp => "cameraPitchUp",
            Action::CameraPitchDown => "cameraPitchDown",
            Action::CameraYawLeft => "cameraYawLeft",
            Action::CameraYawRight => "cameraYawRight",
            Action::MoveForward => "moveForward",
            Action::MoveBackward => "moveBackward",
            Action::Notes => "notes",
            Action::Help => "help",
        }
    }

    pub fn command(&self) -> Command {
        match self {
            Action::TiltLeft => Command::Left,
            Action::TiltRight => Command::Right,
            Action::MoveUpwards => Command::Up,
            Action::MoveDownwards => Command::Down,
            Action::CameraPitchUp => Command::CameraPitchUp,
            Action::CameraPitchDown => Command::CameraPitchDown,
            Action::CameraYawLeft => Command::CameraYawLeft,
            Action::CameraYawRight => Command::CameraYawRight,
            Action::MoveForward => Command::Forward,
            Action::MoveBackward => Command::Backward,
            Action::Notes => Command::Notes,
            Action::Help => Command::Help,
        }
    }
}

impl FromStr for Action {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        Action::PRECEDENCE
            .iter()
            .copied()
            .find(|a| a.name() == s)
            .ok_or_else(|| BridgeError::Config(format!("unknown action '{}'", s)))
    }
}

/// A physical input a profile can bind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PhysicalInput {
    /// Keyboard key, stored in canonical form (see [`canonical_key`]).
    Key(String),
    /// Gamepad button index.
    Button(u8),
    /// Gamepad axis index, active when deflected past the deadzone in the
    /// given direction.
    Axis { index: u8, positive: bool },
}

impl fmt::Display for PhysicalInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicalInput::Key(k) => write!(f, "{:?}", k),
            PhysicalInput::Button(i) => write!(f, "button:{}", i),
            PhysicalInput::Axis { index, positive } => {
                write!(f, "axis:{}{}", index, if *positive { '+' } else { '-' })
            }
        }
    }
}

/// Canonical key name: single letters lowercased, aliases folded.
pub fn canonical_key(key: &str) -> String {
    match key {
        "Space" | "Spacebar" => " ".to_string(),
        "Control" => "Ctrl".to_string(),
        "Esc" => "Escape".to_string(),
        k if k.chars().count() == 1 => k.to_lowercase(),
        k => k.to_string(),
    }
}

impl FromStr for PhysicalInput {
    type Err = BridgeError;

    /// Accepts `"button:N"`, `"axis:N+"`, `"axis:N-"` or a key name.
    fn from_str(s: &str) -> Result<Self> {
        let bad = || BridgeError::Config(format!("unrecognized physical input '{}'", s));

        if let Some(idx) = s.strip_prefix("button:") {
            return idx.parse().map(PhysicalInput::Button).map_err(|_| bad());
        }
        if let Some(rest) = s.strip_prefix("axis:") {
            let (idx, positive) = if let Some(i) = rest.strip_suffix('+') {
                (i, true)
            } else if let Some(i) = rest.strip_suffix('-') {
                (i, false)
            } else {
                return Err(bad());
            };
            let index = idx.parse().map_err(|_| bad())?;
            return Ok(PhysicalInput::Axis { index, positive });
        }

        let key = canonical_key(s);
        let single_printable = key.chars().count() == 1
            && key.chars().all(|c| c == ' ' || c.is_ascii_graphic());
        if single_printable || NAMED_KEYS.contains(&key.as_str()) {
            Ok(PhysicalInput::Key(key))
        } else {
            Err(bad())
        }
    }
}

/// Named mapping from logical actions to physical inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingProfile {
    name: String,
    bindings: HashMap<Action, PhysicalInput>,
}

impl BindingProfile {
    /// Build a profile from textual `action -> input` entries.
    ///
    /// Unknown action names, unrecognized inputs and two actions bound to
    /// the same input are configuration errors.
    pub fn from_entries<'a, I>(name: &str, entries: I) -> Result<BindingProfile>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut bindings = HashMap::new();
        let mut owners: HashMap<PhysicalInput, Action> = HashMap::new();

        for (action_name, input_name) in entries {
            let action: Action = action_name.parse()?;
            let input: PhysicalInput = input_name.parse()?;
            if let Some(other) = owners.get(&input) {
                if *other != action {
                    return Err(BridgeError::Config(format!(
                        "profile '{}': {} is bound to both '{}' and '{}'",
                        name,
                        input,
                        other.name(),
                        action.name()
                    )));
                }
            }
            if let Some(old) = bindings.insert(action, input.clone()) {
                owners.remove(&old);
            }
            owners.insert(input, action);
        }

        Ok(BindingProfile {
            name: name.to_string(),
            bindings,
        })
    }

    /// Keyboard layout with WASD flight and arrow-key camera.
    pub fn skydio() -> BindingProfile {
        Self::keyboard(
            "skydio",
            &[
                (Action::MoveForward, "w"),
                (Action::MoveBackward, "s"),
                (Action::TiltLeft, "a"),
                (Action::TiltRight, "d"),
                (Action::MoveUpwards, " "),
                (Action::MoveDownwards, "Shift"),
                (Action::CameraPitchUp, "ArrowUp"),
                (Action::CameraPitchDown, "ArrowDown"),
                (Action::CameraYawLeft, "ArrowLeft"),
                (Action::CameraYawRight, "ArrowRight"),
                (Action::Notes, "Tab"),
                (Action::Help, "h"),
            ],
        )
    }

    /// Keyboard layout with arrow-key flight and WASD climb/camera.
    pub fn nightingale() -> BindingProfile {
        Self::keyboard(
            "nightingale",
            &[
                (Action::MoveForward, "ArrowUp"),
                (Action::MoveBackward, "ArrowDown"),
                (Action::TiltLeft, "ArrowLeft"),
                (Action::TiltRight, "ArrowRight"),
                (Action::MoveUpwards, "w"),
                (Action::MoveDownwards, "s"),
                (Action::CameraPitchUp, "Shift"),
                (Action::CameraPitchDown, "Ctrl"),
                (Action::CameraYawLeft, "a"),
                (Action::CameraYawRight, "d"),
                (Action::Notes, "Tab"),
                (Action::Help, "h"),
            ],
        )
    }

    fn keyboard(name: &str, keys: &[(Action, &str)]) -> BindingProfile {
        BindingProfile {
            name: name.to_string(),
            bindings: keys
                .iter()
                .map(|(action, key)| (*action, PhysicalInput::Key(canonical_key(key))))
                .collect(),
        }
    }

    pub fn builtin(name: &str) -> Option<BindingProfile> {
        match name {
            "skydio" => Some(Self::skydio()),
            "nightingale" => Some(Self::nightingale()),
            _ => None,
        }
    }

    /// Resolve a profile by name, preferring user-defined tables over the
    /// built-in ones.
    pub fn resolve(
        name: &str,
        custom: &HashMap<String, HashMap<String, String>>,
    ) -> Result<BindingProfile> {
        if let Some(table) = custom.get(name) {
            return Self::from_entries(
                name,
                table.iter().map(|(a, i)| (a.as_str(), i.as_str())),
            );
        }
        Self::builtin(name)
            .ok_or_else(|| BridgeError::Config(format!("unknown binding profile '{}'", name)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_for(&self, action: Action) -> Option<&PhysicalInput> {
        self.bindings.get(&action)
    }
}

impl Default for BindingProfile {
    fn default() -> Self {
        Self::skydio()
    }
}

/// One poll of gamepad state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GamepadSnapshot {
    pub buttons: Vec<bool>,
    /// Raw axes in [-1, 1]: 0/1 left stick, 2/3 right stick.
    pub axes: Vec<f32>,
}

/// Raw operator input.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    KeyDown { key: String, repeat: bool },
    KeyUp { key: String },
    Gamepad(GamepadSnapshot),
    /// Focus moved; `interactive` is true for editable/interactive targets.
    Focus { interactive: bool },
}

/// Stick vector after deadzone clamping, with its compass direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StickReading {
    pub vector: StickVector,
    pub direction: Direction,
}

/// Output of the normalizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormalizedInput {
    Command(Command),
    /// The last held binding was released.
    Released,
    Stick { stick: Stick, reading: StickReading },
}

/// Clamp each component below `deadzone` to zero (and into [-1, 1]).
pub fn normalize_stick(x: f32, y: f32, deadzone: f32) -> StickVector {
    let clamp = |v: f32| {
        let v = if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 };
        if v.abs() < deadzone {
            0.0
        } else {
            v
        }
    };
    StickVector {
        x: clamp(x),
        y: clamp(y),
    }
}

/// Compass sector for an angle in degrees as returned by `atan2(y, x)`.
pub fn direction_from_angle(angle: f64) -> Direction {
    if (-22.5..22.5).contains(&angle) {
        Direction::Right
    } else if (22.5..67.5).contains(&angle) {
        Direction::DownRight
    } else if (67.5..112.5).contains(&angle) {
        Direction::Down
    } else if (112.5..157.5).contains(&angle) {
        Direction::DownLeft
    } else if angle >= 157.5 || angle < -157.5 {
        Direction::Left
    } else if (-157.5..-112.5).contains(&angle) {
        Direction::UpLeft
    } else if (-112.5..-67.5).contains(&angle) {
        Direction::Up
    } else if (-67.5..-22.5).contains(&angle) {
        Direction::UpRight
    } else {
        Direction::Neutral
    }
}

/// Direction of an already-clamped vector.
pub fn direction(v: &StickVector) -> Direction {
    if v.x == 0.0 && v.y == 0.0 {
        return Direction::Neutral;
    }
    direction_from_angle((v.y as f64).atan2(v.x as f64).to_degrees())
}

pub fn read_stick(x: f32, y: f32, deadzone: f32) -> StickReading {
    let vector = normalize_stick(x, y, deadzone);
    StickReading {
        vector,
        direction: direction(&vector),
    }
}

/// Stateful normalizer.
///
/// Only the rising edge of a bound input emits a command, and only when no
/// bound input is already held; while held, further presses are ignored
/// until everything is released. When several bound inputs become active
/// together, the one earliest in [`Action::PRECEDENCE`] wins.
pub struct InputNormalizer {
    profile: BindingProfile,
    deadzone: f32,
    enabled: bool,
    held: bool,
    keys_down: HashSet<String>,
    gamepad: GamepadSnapshot,
    left: StickReading,
    right: StickReading,
}

impl InputNormalizer {
    pub fn new(profile: BindingProfile, deadzone: f32) -> Self {
        let neutral = read_stick(0.0, 0.0, deadzone);
        Self {
            profile,
            deadzone,
            enabled: true,
            held: false,
            keys_down: HashSet::new(),
            gamepad: GamepadSnapshot::default(),
            left: neutral,
            right: neutral,
        }
    }

    pub fn profile(&self) -> &BindingProfile {
        &self.profile
    }

    pub fn hotkeys_enabled(&self) -> bool {
        self.enabled
    }

    /// Swap the active profile. A held binding is released first.
    pub fn set_profile(&mut self, profile: BindingProfile) -> Option<NormalizedInput> {
        log::info!("Binding profile: {} -> {}", self.profile.name(), profile.name());
        self.profile = profile;
        self.release_held()
    }

    /// Globally enable or disable discrete commands.
    pub fn set_enabled(&mut self, enabled: bool) -> Option<NormalizedInput> {
        if self.enabled == enabled {
            return None;
        }
        log::debug!("Hotkeys {}", if enabled { "enabled" } else { "disabled" });
        self.enabled = enabled;
        if enabled {
            None
        } else {
            self.release_held()
        }
    }

    pub fn toggle_enabled(&mut self) -> Option<NormalizedInput> {
        self.set_enabled(!self.enabled)
    }

    fn release_held(&mut self) -> Option<NormalizedInput> {
        if std::mem::take(&mut self.held) {
            Some(NormalizedInput::Released)
        } else {
            None
        }
    }

    fn axis(&self, index: usize) -> f32 {
        self.gamepad.axes.get(index).copied().unwrap_or(0.0)
    }

    fn is_active(&self, input: &PhysicalInput) -> bool {
        match input {
            PhysicalInput::Key(k) => self.keys_down.contains(k),
            PhysicalInput::Button(i) => self
                .gamepad
                .buttons
                .get(*i as usize)
                .copied()
                .unwrap_or(false),
            PhysicalInput::Axis { index, positive } => {
                let v = self.axis(*index as usize);
                let v = if v.abs() < self.deadzone { 0.0 } else { v };
                if *positive {
                    v > 0.0
                } else {
                    v < 0.0
                }
            }
        }
    }

    fn active_actions(&self) -> Vec<Action> {
        Action::PRECEDENCE
            .iter()
            .copied()
            .filter(|a| self.profile.input_for(*a).is_some_and(|i| self.is_active(i)))
            .collect()
    }

    /// Feed one raw event; returns what it produced, in order.
    pub fn handle(&mut self, event: InputEvent) -> Vec<NormalizedInput> {
        let mut out = Vec::new();
        let before = self.active_actions();

        match event {
            InputEvent::KeyDown { repeat: true, .. } => return out,
            InputEvent::KeyDown { key, .. } => {
                self.keys_down.insert(canonical_key(&key));
            }
            InputEvent::KeyUp { key } => {
                self.keys_down.remove(&canonical_key(&key));
            }
            InputEvent::Gamepad(snapshot) => {
                self.gamepad = snapshot;
                let left = read_stick(self.axis(0), self.axis(1), self.deadzone);
                let right = read_stick(self.axis(2), self.axis(3), self.deadzone);
                if left != self.left {
                    self.left = left;
                    out.push(NormalizedInput::Stick {
                        stick: Stick::Left,
                        reading: left,
                    });
                }
                if right != self.right {
                    self.right = right;
                    out.push(NormalizedInput::Stick {
                        stick: Stick::Right,
                        reading: right,
                    });
                }
            }
            InputEvent::Focus { interactive } => {
                out.extend(self.set_enabled(!interactive));
                return out;
            }
        }

        let after = self.active_actions();
        if after.is_empty() {
            out.extend(self.release_held());
            return out;
        }
        if !self.enabled || self.held {
            return out;
        }

        let rising = after.iter().any(|a| !before.contains(a));
        if rising {
            // `after` is already in precedence order.
            let action = after[0];
            self.held = true;
            log::debug!("{} -> {}", action.name(), action.command());
            out.push(NormalizedInput::Command(action.command()));
        }
        out
    }
}
