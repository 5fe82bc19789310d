//! Standard chess on top of the `chess` crate.

use std::str::FromStr;

use chess::{Board, BoardStatus, ChessMove, Piece, Rank, Square};
use gambit_protocol::{Color, EndReason, MoveRequest, Outcome};

use crate::rules::{MoveVerdict, RulesEngine};

/// A chess position plus the hashes needed for repetition detection.
///
/// `history` holds the Zobrist hash of every position since the last
/// pawn move or capture, current position last. Nothing before an
/// irreversible move can repeat, so the list is reset there.
#[derive(Debug, Clone)]
pub struct ChessPosition {
    board: Board,
    history: Vec<u64>,
}

impl ChessPosition {
    fn fresh(board: Board) -> Self {
        Self {
            history: vec![board.get_hash()],
            board,
        }
    }

    /// The underlying board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    fn repetitions(&self) -> usize {
        let current = self.board.get_hash();
        self.history.iter().filter(|&&h| h == current).count()
    }
}

/// Standard chess rules: legal moves, checkmate, stalemate, threefold
/// repetition, and insufficient material (bare kings, or a single minor
/// piece).
#[derive(Debug, Clone, Copy, Default)]
pub struct ChessRules;

fn to_color(color: chess::Color) -> Color {
    match color {
        chess::Color::White => Color::White,
        chess::Color::Black => Color::Black,
    }
}

fn promotion_piece(letter: char) -> Option<Piece> {
    match letter.to_ascii_lowercase() {
        'q' => Some(Piece::Queen),
        'r' => Some(Piece::Rook),
        'b' => Some(Piece::Bishop),
        'n' => Some(Piece::Knight),
        _ => None,
    }
}

fn parse_square(square: &str) -> Option<Square> {
    Square::from_str(&square.trim().to_ascii_lowercase()).ok()
}

fn insufficient_material(board: &Board) -> bool {
    let heavy = board.pieces(Piece::Pawn).popcnt()
        + board.pieces(Piece::Rook).popcnt()
        + board.pieces(Piece::Queen).popcnt();
    let minors = board.pieces(Piece::Knight).popcnt()
        + board.pieces(Piece::Bishop).popcnt();
    heavy == 0 && minors <= 1
}

impl RulesEngine for ChessRules {
    type Board = ChessPosition;

    fn initial_board(&self) -> ChessPosition {
        ChessPosition::fresh(Board::default())
    }

    fn apply(&self, position: &ChessPosition, mv: &MoveRequest) -> MoveVerdict<ChessPosition> {
        let (Some(from), Some(to)) = (parse_square(&mv.from), parse_square(&mv.to)) else {
            return MoveVerdict::Rejected {
                reason: format!("invalid square in {}", mv.notation()),
            };
        };
        let board = &position.board;
        let moving = board.piece_on(from);

        let promotion = match mv.promotion {
            None => None,
            Some(letter) => match promotion_piece(letter) {
                Some(piece) => Some(piece),
                None => {
                    return MoveVerdict::Rejected {
                        reason: format!("invalid promotion piece '{letter}'"),
                    };
                }
            },
        };
        if moving == Some(Piece::Pawn)
            && promotion.is_none()
            && matches!(to.get_rank(), Rank::First | Rank::Eighth)
        {
            return MoveVerdict::Rejected {
                reason: "promotion piece required".into(),
            };
        }

        let chess_move = ChessMove::new(from, to, promotion);
        if !board.legal(chess_move) {
            return MoveVerdict::Rejected {
                reason: format!("illegal move {}", mv.notation()),
            };
        }

        let irreversible = moving == Some(Piece::Pawn) || board.piece_on(to).is_some();
        let next = board.make_move_new(chess_move);
        let mut history = if irreversible {
            Vec::new()
        } else {
            position.history.clone()
        };
        history.push(next.get_hash());

        MoveVerdict::Applied {
            turn: to_color(next.side_to_move()),
            notation: chess_move.to_string(),
            board: ChessPosition {
                board: next,
                history,
            },
        }
    }

    fn turn(&self, position: &ChessPosition) -> Color {
        to_color(position.board.side_to_move())
    }

    fn classify(&self, position: &ChessPosition) -> Option<Outcome> {
        let board = &position.board;
        match board.status() {
            BoardStatus::Checkmate => {
                let winner = to_color(board.side_to_move()).opposite();
                return Some(Outcome::win(winner, EndReason::Checkmate));
            }
            BoardStatus::Stalemate => return Some(Outcome::draw(EndReason::Stalemate)),
            BoardStatus::Ongoing => {}
        }
        if insufficient_material(board) {
            return Some(Outcome::draw(EndReason::InsufficientMaterial));
        }
        if position.repetitions() >= 3 {
            return Some(Outcome::draw(EndReason::Repetition));
        }
        None
    }

    fn serialize(&self, position: &ChessPosition) -> String {
        position.board.to_string()
    }

    fn parse(&self, serialized: &str) -> Option<ChessPosition> {
        Board::from_str(serialized.trim())
            .ok()
            .map(ChessPosition::fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(rules: &ChessRules, moves: &[&str]) -> ChessPosition {
        let mut pos = rules.initial_board();
        for m in moves {
            let mv = MoveRequest::from_notation(m).unwrap();
            match rules.apply(&pos, &mv) {
                MoveVerdict::Applied { board, .. } => pos = board,
                MoveVerdict::Rejected { reason } => panic!("{m} rejected: {reason}"),
            }
        }
        pos
    }

    #[test]
    fn test_initial_board_white_to_move() {
        let rules = ChessRules;
        let pos = rules.initial_board();
        assert_eq!(rules.turn(&pos), Color::White);
        assert!(rules.classify(&pos).is_none());
        assert!(rules.serialize(&pos).starts_with("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w"));
    }

    #[test]
    fn test_apply_legal_move_flips_turn_and_emits_notation() {
        let rules = ChessRules;
        let pos = rules.initial_board();
        match rules.apply(&pos, &MoveRequest::new("e2", "e4")) {
            MoveVerdict::Applied { turn, notation, .. } => {
                assert_eq!(turn, Color::Black);
                assert_eq!(notation, "e2e4");
            }
            other => panic!("expected Applied, got {other:?}"),
        }
    }

    #[test]
    fn test_apply_illegal_move_rejected() {
        let rules = ChessRules;
        let pos = rules.initial_board();
        let verdict = rules.apply(&pos, &MoveRequest::new("e2", "e5"));
        assert!(matches!(verdict, MoveVerdict::Rejected { .. }));
    }

    #[test]
    fn test_apply_garbage_square_rejected() {
        let rules = ChessRules;
        let pos = rules.initial_board();
        let verdict = rules.apply(&pos, &MoveRequest::new("z9", "e4"));
        assert!(matches!(verdict, MoveVerdict::Rejected { .. }));
    }

    #[test]
    fn test_classify_fools_mate_black_wins() {
        let rules = ChessRules;
        let pos = play(&rules, &["f2f3", "e7e5", "g2g4", "d8h4"]);
        assert_eq!(
            rules.classify(&pos),
            Some(Outcome::win(Color::Black, EndReason::Checkmate))
        );
    }

    #[test]
    fn test_classify_threefold_repetition() {
        let rules = ChessRules;
        let shuffle = [
            "g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8",
        ];
        let pos = play(&rules, &shuffle);
        assert_eq!(
            rules.classify(&pos),
            Some(Outcome::draw(EndReason::Repetition))
        );
    }

    #[test]
    fn test_classify_bare_kings_is_insufficient_material() {
        let rules = ChessRules;
        let pos = rules.parse("8/8/4k3/8/8/4K3/8/8 w - - 0 1").unwrap();
        assert_eq!(
            rules.classify(&pos),
            Some(Outcome::draw(EndReason::InsufficientMaterial))
        );
    }

    #[test]
    fn test_classify_stalemate() {
        let rules = ChessRules;
        let pos = rules.parse("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert_eq!(
            rules.classify(&pos),
            Some(Outcome::draw(EndReason::Stalemate))
        );
    }

    #[test]
    fn test_promotion_requires_piece() {
        let rules = ChessRules;
        let pos = rules.parse("8/4P3/8/8/8/k7/8/4K3 w - - 0 1").unwrap();
        assert!(matches!(
            rules.apply(&pos, &MoveRequest::new("e7", "e8")),
            MoveVerdict::Rejected { .. }
        ));
        let verdict = rules.apply(&pos, &MoveRequest::from_notation("e7e8q").unwrap());
        match verdict {
            MoveVerdict::Applied { notation, .. } => assert_eq!(notation, "e7e8q"),
            other => panic!("expected Applied, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ChessRules.parse("not a fen").is_none());
    }

    #[test]
    fn test_serialize_parse_preserves_turn() {
        let rules = ChessRules;
        let pos = play(&rules, &["e2e4"]);
        let restored = rules.parse(&rules.serialize(&pos)).unwrap();
        assert_eq!(rules.turn(&restored), Color::Black);
    }
}
