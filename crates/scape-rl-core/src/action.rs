//! Action types and the action space that validates them

use crate::error::{Result, ScapeRLError};
use serde::{Deserialize, Serialize};

/// Mouse buttons understood by the bridge (`DOWN`/`UP` commands)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CursorButton {
    Left,
    Middle,
    Right,
}

impl CursorButton {
    /// Wire value for `DOWN`/`UP`
    pub fn as_i32(self) -> i32 {
        match self {
            CursorButton::Left => 1,
            CursorButton::Middle => 2,
            CursorButton::Right => 3,
        }
    }
}

/// An input action against the simulation client.
///
/// Coordinates are in controller space (the resized observation geometry),
/// not raw client pixels; the environment maps them before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Do nothing this step (still advances one tick)
    Noop,
    /// Move the cursor
    Move { x: u32, y: u32 },
    /// Move the cursor, then press and release the left button
    LeftClick { x: u32, y: u32 },
    /// Move the cursor, then press and release the right button
    RightClick { x: u32, y: u32 },
}

impl Action {
    /// Target coordinates, if the action has any
    pub fn target(&self) -> Option<(u32, u32)> {
        match *self {
            Action::Noop => None,
            Action::Move { x, y } | Action::LeftClick { x, y } | Action::RightClick { x, y } => {
                Some((x, y))
            }
        }
    }
}

/// Valid coordinate range for actions. Out-of-range coordinates are rejected
/// at construction rather than clamped downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSpace {
    pub width: u32,
    pub height: u32,
}

impl ActionSpace {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn check(&self, x: u32, y: u32) -> Result<()> {
        if x >= self.width || y >= self.height {
            return Err(ScapeRLError::InvalidAction(format!(
                "coordinates ({}, {}) outside {}x{}",
                x, y, self.width, self.height
            )));
        }
        Ok(())
    }

    pub fn noop(&self) -> Action {
        Action::Noop
    }

    pub fn move_to(&self, x: u32, y: u32) -> Result<Action> {
        self.check(x, y)?;
        Ok(Action::Move { x, y })
    }

    pub fn left_click(&self, x: u32, y: u32) -> Result<Action> {
        self.check(x, y)?;
        Ok(Action::LeftClick { x, y })
    }

    pub fn right_click(&self, x: u32, y: u32) -> Result<Action> {
        self.check(x, y)?;
        Ok(Action::RightClick { x, y })
    }

    /// Validate an action built elsewhere against this space.
    pub fn ensure(&self, action: &Action) -> Result<()> {
        match action.target() {
            Some((x, y)) => self.check(x, y),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_range_actions() {
        let space = ActionSpace::new(384, 252);

        assert_eq!(space.move_to(0, 0).unwrap(), Action::Move { x: 0, y: 0 });
        assert_eq!(
            space.left_click(383, 251).unwrap(),
            Action::LeftClick { x: 383, y: 251 }
        );
        assert_eq!(space.noop(), Action::Noop);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let space = ActionSpace::new(384, 252);

        assert!(matches!(
            space.move_to(384, 0),
            Err(ScapeRLError::InvalidAction(_))
        ));
        assert!(matches!(
            space.right_click(10, 252),
            Err(ScapeRLError::InvalidAction(_))
        ));
    }

    #[test]
    fn test_ensure_checks_prebuilt_actions() {
        let space = ActionSpace::new(100, 100);

        assert!(space.ensure(&Action::Noop).is_ok());
        assert!(space.ensure(&Action::Move { x: 99, y: 99 }).is_ok());
        assert!(space.ensure(&Action::LeftClick { x: 100, y: 0 }).is_err());
    }

    #[test]
    fn test_button_wire_values() {
        assert_eq!(CursorButton::Left.as_i32(), 1);
        assert_eq!(CursorButton::Middle.as_i32(), 2);
        assert_eq!(CursorButton::Right.as_i32(), 3);
    }
}
