use anyhow::{Context, Result};
use enigo::{Button, Coordinate, Direction, Enigo, Mouse, Settings};

/// Dispatches a left click at an absolute desktop position.
pub trait Clicker: Send + Sync {
    fn click(&self, x: i32, y: i32) -> Result<()>;
}

/// Synthesizes real mouse input through the OS.
pub struct MouseClicker;

impl Clicker for MouseClicker {
    fn click(&self, x: i32, y: i32) -> Result<()> {
        // A fresh connection per click; clicks are rare and the handle is not Send everywhere.
        let mut enigo = Enigo::new(&Settings::default()).context("Failed to open input device")?;
        enigo
            .move_mouse(x, y, Coordinate::Abs)
            .context("Failed to move mouse")?;
        enigo
            .button(Button::Left, Direction::Click)
            .context("Failed to click")?;
        Ok(())
    }
}
