//! Tic-tac-toe board model and rules engine.
//!
//! This crate has no I/O and no notion of sessions or players. It answers
//! one question: given a board, is the game still going, won, or drawn?
//!
//! # Example
//!
//! ```
//! use tictac_rules::{evaluate, Board, Evaluation, Mark, Position};
//!
//! let mut board = Board::new();
//! for pos in [Position::TopLeft, Position::TopCenter, Position::TopRight] {
//!     board.place(pos, Mark::X).unwrap();
//! }
//! assert!(matches!(evaluate(&board), Evaluation::Won { mark: Mark::X, .. }));
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod position;
mod rules;
mod types;

pub use position::Position;
pub use rules::{Evaluation, LINES, Line, check_winner, evaluate, is_full, winning_line};
pub use types::{Board, BoardError, Mark, Square};
