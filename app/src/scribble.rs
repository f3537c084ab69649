use core::fmt::Write;

use touchscreen::{EventKind, PointerEvent};

const COLORS: [&str; 7] = ["white", "yellow", "magenta", "red", "cyan", "lime", "blue"];

/// Turns pointer events into drawing commands on the console. Each stroke
/// starts with a clear and gets the next color in the palette.
pub struct Scribble {
    last: (i32, i32),
    color: usize,
}

impl Scribble {
    pub const fn new() -> Self {
        Self {
            last: (0, 0),
            color: 0,
        }
    }

    pub fn handle<W: Write>(&mut self, event: PointerEvent, out: &mut W) -> core::fmt::Result {
        let point = (event.x, event.y);
        match event.kind {
            EventKind::Down => {
                writeln!(out, "clear")?;
            }
            EventKind::Move => {
                self.line(point, out)?;
            }
            EventKind::Up => {
                self.line(point, out)?;
                self.color = (self.color + 1) % COLORS.len();
            }
        }
        self.last = point;
        Ok(())
    }

    fn line<W: Write>(&self, to: (i32, i32), out: &mut W) -> core::fmt::Result {
        writeln!(
            out,
            "line {} {},{} {},{}",
            COLORS[self.color], self.last.0, self.last.1, to.0, to.1
        )
    }
}
