use std::collections::HashMap;

use tracing::error;

use crate::{parse_hex_color, Game, GameFrame, Point, Rgba, Snake, COLOR_DEAD_SNAKE};

/// Dead snakes stay on the board for this many turns after dying.
const DEAD_SNAKE_LINGER_TURNS: i32 = 10;

const DEFAULT_HEAD: &str = "default";
const DEFAULT_TAIL: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Classifies a body segment whose neighbours form an L-shaped bend.
/// The vertical half is "top" when the bend's vertical neighbour sits below
/// the corner square, and the horizontal half follows the side the horizontal
/// neighbour is on, both under short-way-around wrap semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    None,
}

impl Corner {
    pub fn is_bottom(&self) -> bool {
        matches!(self, Corner::BottomLeft | Corner::BottomRight)
    }

    pub fn is_left(&self) -> bool {
        matches!(self, Corner::TopLeft | Corner::BottomLeft)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Food,
    Hazard,
    SnakeHead,
    SnakeBody,
    SnakeTail,
}

/// A single piece of content placed on a board square: food, a hazard
/// overlay, or one snake segment.
#[derive(Debug, Clone)]
pub struct SquareContent {
    pub kind: ContentKind,
    pub color: Option<Rgba>,
    /// Head or tail customisation name, for segments rendered as sprites.
    pub snake_type: Option<String>,
    pub direction: Direction,
    pub corner: Corner,
}

impl SquareContent {
    fn plain(kind: ContentKind) -> Self {
        SquareContent {
            kind,
            color: None,
            snake_type: None,
            direction: Direction::Right,
            corner: Corner::None,
        }
    }
}

/// The abstract per-frame grid: every occupied square maps to an ordered
/// list of contents, later additions stacking above earlier ones. Empty
/// squares are absent from the map.
#[derive(Debug, Clone)]
pub struct Board {
    pub width: i32,
    pub height: i32,
    squares: HashMap<Point, Vec<SquareContent>>,
}

/// Infers the direction from `p` to its adjacent point `q`, treating the
/// board as a torus: a step of more than one square must have wrapped, and
/// the short way around wins. Stepping one square from `p` in the returned
/// direction (modulo board size) always lands on `q`.
pub fn direction_between(p: Point, q: Point) -> Direction {
    // points that haven't changed are common; default to "right"
    if p == q {
        return Direction::Right;
    }

    let dx = q.x - p.x;
    let dy = q.y - p.y;

    if dy == 0 {
        return match dx {
            1 => Direction::Right,
            -1 => Direction::Left,
            _ if dx > 1 => Direction::Left,
            _ => Direction::Right,
        };
    }

    if dx == 0 {
        return match dy {
            1 => Direction::Up,
            -1 => Direction::Down,
            _ if dy > 1 => Direction::Down,
            _ => Direction::Up,
        };
    }

    error!("unable to determine snake direction: {:?} to {:?}", p, q);
    Direction::Right
}

/// Classifies the corner formed at `cur` by its body neighbours `prev` and
/// `next`. Symmetric in `prev`/`next`.
pub fn corner_between(prev: Point, cur: Point, next: Point) -> Corner {
    // a corner needs both an X and a Y change across the three points
    if (prev.x == cur.x && prev.x == next.x) || (prev.y == cur.y && prev.y == next.y) {
        return Corner::None;
    }

    // exactly one neighbour differs in Y; a |diff| other than 1 means the
    // step wrapped and the sign test inverts
    let mut y_diff = cur.y - prev.y;
    if y_diff == 0 {
        y_diff = cur.y - next.y;
    }
    let above = if y_diff.abs() == 1 {
        y_diff < 0
    } else {
        y_diff > 0
    };

    let mut x_diff = cur.x - prev.x;
    if x_diff == 0 {
        x_diff = cur.x - next.x;
    }
    let right_of = if x_diff.abs() == 1 {
        x_diff < 0
    } else {
        x_diff > 0
    };

    match (above, right_of) {
        (true, true) => Corner::BottomRight,
        (true, false) => Corner::BottomLeft,
        (false, true) => Corner::TopRight,
        (false, false) => Corner::TopLeft,
    }
}

impl Board {
    pub fn new(width: i32, height: i32) -> Self {
        Board {
            width,
            height,
            squares: HashMap::new(),
        }
    }

    /// Folds one engine frame into a board. Total: any valid frame produces
    /// a board without panicking.
    pub fn from_game_frame(game: &Game, frame: &GameFrame) -> Self {
        let mut board = Board::new(game.width, game.height);

        // First place recently dead snakes so everything else stacks above them
        for snake in &frame.snakes {
            if let Some(death) = &snake.death {
                if frame.turn - death.turn <= DEAD_SNAKE_LINGER_TURNS {
                    board.place_snake(snake);
                }
            }
        }

        // Second, food
        for point in &frame.food {
            board.add_food(*point);
        }

        // Third, alive snakes
        for snake in &frame.snakes {
            if snake.death.is_none() {
                board.place_snake(snake);
            }
        }

        // Fourth, hazards
        for point in &frame.hazards {
            board.add_hazard(*point);
        }

        board
    }

    /// Contents of the square at (x, y). Safe for any position; empty
    /// squares yield an empty slice.
    pub fn contents(&self, x: i32, y: i32) -> &[SquareContent] {
        self.squares
            .get(&Point::new(x, y))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Iterates the occupied squares only.
    pub fn occupied(&self) -> impl Iterator<Item = (&Point, &Vec<SquareContent>)> {
        self.squares.iter()
    }

    fn add_content(&mut self, p: Point, content: SquareContent) {
        self.squares.entry(p).or_default().push(content);
    }

    /// Removes the first content of the given kind from (x, y) if present.
    fn remove_if_exists(&mut self, p: Point, kind: ContentKind) {
        if let Some(contents) = self.squares.get_mut(&p) {
            if let Some(idx) = contents.iter().position(|c| c.kind == kind) {
                contents.remove(idx);
                if contents.is_empty() {
                    self.squares.remove(&p);
                }
            }
        }
    }

    fn add_food(&mut self, p: Point) {
        self.add_content(p, SquareContent::plain(ContentKind::Food));
    }

    fn add_hazard(&mut self, p: Point) {
        self.add_content(p, SquareContent::plain(ContentKind::Hazard));
    }

    fn add_snake_head(&mut self, p: Point, color: Rgba, snake_type: &str, direction: Direction) {
        self.add_content(
            p,
            SquareContent {
                kind: ContentKind::SnakeHead,
                color: Some(color),
                snake_type: Some(snake_type.to_string()),
                direction,
                corner: Corner::None,
            },
        );
    }

    fn add_snake_body(&mut self, p: Point, color: Rgba, direction: Direction, corner: Corner) {
        self.add_content(
            p,
            SquareContent {
                kind: ContentKind::SnakeBody,
                color: Some(color),
                snake_type: None,
                direction,
                corner,
            },
        );
    }

    fn add_snake_tail(&mut self, p: Point, color: Rgba, snake_type: &str, direction: Direction) {
        // when a snake eats and grows, the tail lands on the same square as
        // a body segment; the tail is the one that renders
        self.remove_if_exists(p, ContentKind::SnakeBody);

        self.add_content(
            p,
            SquareContent {
                kind: ContentKind::SnakeTail,
                color: Some(color),
                snake_type: Some(snake_type.to_string()),
                direction,
                corner: Corner::None,
            },
        );
    }

    fn place_snake(&mut self, snake: &Snake) {
        let head_type = if snake.head.is_empty() {
            DEFAULT_HEAD
        } else {
            snake.head.as_str()
        };
        let tail_type = if snake.tail.is_empty() {
            DEFAULT_TAIL
        } else {
            snake.tail.as_str()
        };

        let color = if snake.death.is_some() {
            COLOR_DEAD_SNAKE
        } else {
            parse_hex_color(&snake.color)
        };

        let body = &snake.body;
        let last = match body.len().checked_sub(1) {
            Some(last) => last,
            None => return,
        };

        for (i, &point) in body.iter().enumerate() {
            if i == 0 {
                // heads can sit off-board after a wall collision; leave them out
                if point.x < 0 || point.x >= self.width || point.y < 0 || point.y >= self.height {
                    continue;
                }

                let direction = match body.get(1) {
                    Some(&neck) => direction_between(point, neck),
                    None => Direction::Right,
                };
                self.add_snake_head(point, color, head_type, direction);
                continue;
            }

            // skip body parts overlapping the head (just-eaten snakes)
            if point == body[0] {
                continue;
            }

            if i == last {
                let prev = body[i - 1];
                let direction = if prev == point {
                    // just ate: the tail and its predecessor coincide, so
                    // aim at the segment before that instead
                    match i.checked_sub(2).and_then(|j| body.get(j)) {
                        Some(&before) => direction_between(point, before),
                        None => Direction::Right,
                    }
                } else {
                    direction_between(point, prev)
                };
                self.add_snake_tail(point, color, tail_type, direction);
            } else {
                let direction = direction_between(point, body[i + 1]);
                let corner = corner_between(body[i - 1], point, body[i + 1]);
                self.add_snake_body(point, color, direction, corner);
            }
        }
    }
}
