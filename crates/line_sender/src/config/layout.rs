//! Screen coordinates of the target app's UI (1080x1920 portrait)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Fixed coordinates used by the per-target UI traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenLayout {
    /// Home tab in the bottom navigation bar
    pub home_button: Point,
    /// "Friends" entry on the home surface, opens the friend list
    pub friends_button: Point,
    /// Center of the first visible friend row
    pub friend_list_start: Point,
    pub row_height: i32,
    pub rows_per_page: usize,
    /// "Chat" button on the profile popup
    pub chat_button: Point,
    pub chat_input: Point,
    pub send_button: Point,
    pub scroll_from: Point,
    pub scroll_to: Point,
    pub scroll_duration_ms: u32,
}

impl Default for ScreenLayout {
    fn default() -> Self {
        Self {
            home_button: Point::new(108, 1869),
            friends_button: Point::new(143, 399),
            friend_list_start: Point::new(300, 351),
            row_height: 89,
            rows_per_page: 15,
            chat_button: Point::new(252, 1715),
            chat_input: Point::new(400, 1881),
            send_button: Point::new(1040, 1881),
            scroll_from: Point::new(540, 1200),
            scroll_to: Point::new(540, 400),
            scroll_duration_ms: 300,
        }
    }
}

impl ScreenLayout {
    /// Number of page scrolls needed before the row of `index` is visible.
    pub fn pages_to_scroll(&self, index: usize) -> usize {
        index / self.rows_per_page.max(1)
    }

    /// On-screen position of the row for `index` once its page is visible.
    pub fn row_position(&self, index: usize) -> Point {
        let within_page = (index % self.rows_per_page.max(1)) as i32;
        Point::new(
            self.friend_list_start.x,
            self.friend_list_start.y + within_page * self.row_height,
        )
    }
}
