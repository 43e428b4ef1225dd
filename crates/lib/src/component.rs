//! The monorepo components the orchestrator builds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Component {
  /// Scala service, built with sbt
  Backend,
  /// Tauri desktop application
  App,
  /// Rust daemon talking to peripherals over BLE and dbus
  Central,
  /// ESP32 firmware
  Peripheral,
  /// Generated API client
  Client,
}

impl Component {
  pub const ALL: [Component; 5] = [
    Component::Backend,
    Component::App,
    Component::Central,
    Component::Peripheral,
    Component::Client,
  ];

  /// Prefix every cache volume id owned by this component starts with.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Backend => "backend",
      Self::App => "app",
      Self::Central => "central",
      Self::Peripheral => "peripheral",
      Self::Client => "client",
    }
  }
}

impl fmt::Display for Component {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for Component {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::ALL
      .into_iter()
      .find(|c| c.as_str() == s)
      .ok_or_else(|| format!("unknown component '{}'", s))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn names_round_trip() {
    for component in Component::ALL {
      assert_eq!(component.as_str().parse::<Component>().unwrap(), component);
    }
    assert!("frontend".parse::<Component>().is_err());
  }
}
