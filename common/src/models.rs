use serde::{Deserialize, Serialize};

/// A coordinate on the game board. The origin is the bottom-left square and
/// Y grows upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    #[serde(rename = "X")]
    pub x: i32,
    #[serde(rename = "Y")]
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Death {
    #[serde(rename = "Cause")]
    pub cause: String,
    #[serde(rename = "Turn")]
    pub turn: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snake {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    /// Ordered head-first; the last point is the tail.
    #[serde(rename = "Body", default)]
    pub body: Vec<Point>,
    #[serde(rename = "Health", default)]
    pub health: i32,
    #[serde(rename = "Death", default)]
    pub death: Option<Death>,
    /// Display colour as a hex code, e.g. "#3b194d".
    #[serde(rename = "Color", default)]
    pub color: String,
    #[serde(rename = "HeadType", default)]
    pub head: String,
    #[serde(rename = "TailType", default)]
    pub tail: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameFrame {
    #[serde(rename = "Turn", default)]
    pub turn: i32,
    #[serde(rename = "Food", default)]
    pub food: Vec<Point>,
    #[serde(rename = "Snakes", default)]
    pub snakes: Vec<Snake>,
    #[serde(rename = "Hazards", default)]
    pub hazards: Vec<Point>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "Width")]
    pub width: i32,
    #[serde(rename = "Height")]
    pub height: i32,
}
