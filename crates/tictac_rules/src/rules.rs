//! Game rules for tic-tac-toe.
//!
//! Pure functions over a [`Board`]. Win detection lives in [`win`], fullness
//! in [`draw`]; [`evaluate`] combines them into the single verdict the match
//! session acts on.

mod draw;
mod win;

pub use draw::is_full;
pub use win::{LINES, Line, check_winner, winning_line};

use crate::{Board, Mark};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Verdict for a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Evaluation {
    /// No line is complete and empty squares remain.
    Ongoing,
    /// `mark` owns every square of `line`.
    Won {
        /// Winning mark.
        mark: Mark,
        /// First complete line in check order.
        line: Line,
    },
    /// All nine squares are filled and no line is complete.
    Draw,
}

impl Evaluation {
    /// Returns true for `Won` and `Draw`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Evaluation::Ongoing)
    }

    /// Returns the winning mark, if any.
    pub fn winner(&self) -> Option<Mark> {
        match self {
            Evaluation::Won { mark, .. } => Some(*mark),
            Evaluation::Ongoing | Evaluation::Draw => None,
        }
    }
}

/// Evaluates a board.
///
/// Lines are checked rows first, then columns, then the `\` diagonal and the
/// `/` diagonal. A full board with a complete line is a win, not a draw.
#[instrument(skip(board))]
pub fn evaluate(board: &Board) -> Evaluation {
    if let Some((mark, line)) = winning_line(board) {
        return Evaluation::Won { mark, line };
    }
    if is_full(board) {
        return Evaluation::Draw;
    }
    Evaluation::Ongoing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Position;

    fn board_from(rows: [&str; 3]) -> Board {
        let mut board = Board::new();
        for (r, row) in rows.iter().enumerate() {
            for (c, ch) in row.chars().enumerate() {
                let pos = Position::from_row_col(r as i64, c as i64).unwrap();
                match ch {
                    'X' => board.place(pos, Mark::X).unwrap(),
                    'O' => board.place(pos, Mark::O).unwrap(),
                    _ => {}
                }
            }
        }
        board
    }

    #[test]
    fn test_empty_board_ongoing() {
        assert_eq!(evaluate(&Board::new()), Evaluation::Ongoing);
    }

    #[test]
    fn test_column_win() {
        let board = board_from(["O.X", "O.X", "O.."]);
        assert_eq!(
            evaluate(&board),
            Evaluation::Won {
                mark: Mark::O,
                line: [Position::TopLeft, Position::MiddleLeft, Position::BottomLeft],
            }
        );
    }

    #[test]
    fn test_full_board_with_line_is_win() {
        let board = board_from(["XXX", "OOX", "XOO"]);
        assert_eq!(evaluate(&board).winner(), Some(Mark::X));
    }

    #[test]
    fn test_draw() {
        let board = board_from(["XOX", "XOO", "OXX"]);
        assert_eq!(evaluate(&board), Evaluation::Draw);
        assert!(evaluate(&board).is_terminal());
    }

    #[test]
    fn test_partial_board_ongoing() {
        let board = board_from(["XO.", ".X.", "..O"]);
        assert!(!evaluate(&board).is_terminal());
    }
}
