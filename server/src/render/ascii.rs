use std::fmt::Write;

use common::{Board, ContentKind};

const GLYPH_EMPTY: char = ' ';
const GLYPH_FOOD: char = '*';
const GLYPH_SNAKE_HEAD: char = 'H';
const GLYPH_SNAKE_BODY: char = 'O';
const GLYPH_SNAKE_TAIL: char = 'T';
const GLYPH_HAZARD: char = '.';

/// Renders the board as a bordered character grid. A square shows its
/// topmost content, except that hazards only show on otherwise-empty
/// squares: whatever sits under a hazard matters more than the hazard.
pub fn render_ascii(board: &Board) -> String {
    let mut out = String::new();
    let horizontal_border = "-".repeat(board.width as usize + 2);

    let _ = writeln!(out, "{horizontal_border}");
    for y in (0..board.height).rev() {
        out.push('|');
        for x in 0..board.width {
            out.push(square_glyph(board, x, y));
        }
        out.push_str("|\n");
    }
    let _ = writeln!(out, "{horizontal_border}");

    out
}

fn square_glyph(board: &Board, x: i32, y: i32) -> char {
    let contents = board.contents(x, y);
    let Some(mut top) = contents.last() else {
        return GLYPH_EMPTY;
    };

    if top.kind == ContentKind::Hazard && contents.len() > 1 {
        top = &contents[contents.len() - 2];
    }

    match top.kind {
        ContentKind::Food => GLYPH_FOOD,
        ContentKind::SnakeHead => GLYPH_SNAKE_HEAD,
        ContentKind::SnakeBody => GLYPH_SNAKE_BODY,
        ContentKind::SnakeTail => GLYPH_SNAKE_TAIL,
        ContentKind::Hazard => GLYPH_HAZARD,
    }
}
