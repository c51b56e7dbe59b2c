use parlor_types::chess::{
    Board, CastlingRights, ChessMove, LastMove, Piece, PieceKind, Square,
};
use parlor_types::{GameKind, MoveData, Position, Role, RuleViolation, Rules, Snapshot};

/// Chess rules validator. Derives the authoritative post-move position from
/// the prior position and a move descriptor, rejecting illegal moves.
pub struct Chess;

impl Rules for Chess {
    fn kind(&self) -> GameKind {
        GameKind::Chess
    }
    fn apply(
        &self,
        prior: &Position,
        mover: Role,
        mv: &MoveData,
    ) -> Result<Position, RuleViolation> {
        let board = match &prior.board {
            Snapshot::Chess(board) => board,
            Snapshot::Generic(_) => return Err(RuleViolation::WrongKind),
        };
        let mv = match mv {
            MoveData::Chess(mv) => *mv,
            MoveData::Generic(_) => return Err(RuleViolation::WrongKind),
        };
        apply_move(prior, board, mover, mv)
    }
}

/// Everything a validated move does to the board besides relocating the
/// moved piece.
struct MoveEffect {
    captured: Option<Square>,
    rook_shift: Option<(Square, Square)>,
    promotion: Option<PieceKind>,
    new_en_passant: Option<Square>,
}

fn apply_move(
    prior: &Position,
    board: &Board,
    mover: Role,
    mv: ChessMove,
) -> Result<Position, RuleViolation> {
    if !mv.from.on_board() || !mv.to.on_board() || mv.from == mv.to {
        return Err(RuleViolation::IllegalDestination);
    }
    let piece = board.get(mv.from).ok_or(RuleViolation::EmptySquare)?;
    if piece.role != mover {
        return Err(RuleViolation::NotYourPiece);
    }
    let rights = prior.castling.unwrap_or_default();
    let effect = move_effect(board, mover, mv, prior.en_passant, &rights)?;

    let captured_piece = effect.captured.and_then(|sq| board.get(sq));
    let mut next = board.clone();
    if let Some(sq) = effect.captured {
        next.set(sq, None);
    }
    next.set(mv.from, None);
    let placed = match effect.promotion {
        Some(kind) => Piece::new(mover, kind),
        None => piece,
    };
    next.set(mv.to, Some(placed));
    if let Some((rook_from, rook_to)) = effect.rook_shift {
        let rook = next.get(rook_from);
        next.set(rook_from, None);
        next.set(rook_to, rook);
    }

    if in_check(&next, mover) {
        return Err(RuleViolation::IntoCheck);
    }

    let mut rights = rights;
    update_rights(&mut rights, mover, piece, mv, effect.captured, captured_piece);

    let mut white_captures = prior.white_captures;
    let mut black_captures = prior.black_captures;
    if effect.captured.is_some() {
        match mover {
            Role::White => white_captures += 1,
            Role::Black => black_captures += 1,
        }
    }

    let opponent = mover.opponent();
    let opponent_in_check = in_check(&next, opponent);
    let opponent_can_move = has_any_legal_move(&next, opponent, effect.new_en_passant);
    let (game_over, winner) = if opponent_can_move {
        (false, None)
    } else if opponent_in_check {
        (true, Some(mover))
    } else {
        // Stalemate is a draw.
        (true, None)
    };

    Ok(Position {
        board: Snapshot::Chess(next),
        turn: opponent,
        white_captures,
        black_captures,
        castling: Some(rights),
        en_passant: effect.new_en_passant,
        last_move: Some(LastMove {
            from: mv.from,
            to: mv.to,
            piece,
        }),
        game_over,
        winner,
    })
}

fn move_effect(
    board: &Board,
    mover: Role,
    mv: ChessMove,
    en_passant: Option<Square>,
    rights: &CastlingRights,
) -> Result<MoveEffect, RuleViolation> {
    let piece = board.get(mv.from).ok_or(RuleViolation::EmptySquare)?;
    let dest = board.get(mv.to);
    if dest.map(|p| p.role) == Some(mover) {
        return Err(RuleViolation::IllegalDestination);
    }
    let dr = mv.to.row as i8 - mv.from.row as i8;
    let dc = mv.to.col as i8 - mv.from.col as i8;

    let mut effect = MoveEffect {
        captured: dest.map(|_| mv.to),
        rook_shift: None,
        promotion: None,
        new_en_passant: None,
    };

    match piece.kind {
        PieceKind::Pawn => {
            let dir: i8 = match mover {
                Role::White => -1,
                Role::Black => 1,
            };
            let start_row = match mover {
                Role::White => 6,
                Role::Black => 1,
            };
            let promo_row = match mover {
                Role::White => 0,
                Role::Black => 7,
            };
            if dc == 0 && dr == dir && dest.is_none() {
                // Quiet push.
            } else if dc == 0 && dr == 2 * dir && mv.from.row == start_row {
                let skipped = Square::new((mv.from.row as i8 + dir) as u8, mv.from.col);
                if board.get(skipped).is_some() || dest.is_some() {
                    return Err(RuleViolation::Blocked);
                }
                effect.new_en_passant = Some(skipped);
            } else if dc.abs() == 1 && dr == dir {
                if dest.is_some() {
                    // Ordinary diagonal capture.
                } else if en_passant == Some(mv.to) {
                    effect.captured = Some(Square::new(mv.from.row, mv.to.col));
                } else {
                    return Err(RuleViolation::IllegalDestination);
                }
            } else {
                return Err(RuleViolation::IllegalDestination);
            }
            if mv.to.row == promo_row {
                match mv.promotion {
                    Some(
                        kind @ (PieceKind::Queen
                        | PieceKind::Rook
                        | PieceKind::Bishop
                        | PieceKind::Knight),
                    ) => effect.promotion = Some(kind),
                    _ => return Err(RuleViolation::BadPromotion),
                }
            } else if mv.promotion.is_some() {
                return Err(RuleViolation::BadPromotion);
            }
        }
        PieceKind::Knight => {
            if !matches!((dr.abs(), dc.abs()), (1, 2) | (2, 1)) {
                return Err(RuleViolation::IllegalDestination);
            }
        }
        PieceKind::Bishop => {
            if dr.abs() != dc.abs() {
                return Err(RuleViolation::IllegalDestination);
            }
            clear_path(board, mv.from, mv.to)?;
        }
        PieceKind::Rook => {
            if dr != 0 && dc != 0 {
                return Err(RuleViolation::IllegalDestination);
            }
            clear_path(board, mv.from, mv.to)?;
        }
        PieceKind::Queen => {
            if dr != 0 && dc != 0 && dr.abs() != dc.abs() {
                return Err(RuleViolation::IllegalDestination);
            }
            clear_path(board, mv.from, mv.to)?;
        }
        PieceKind::King => {
            if dr.abs() <= 1 && dc.abs() <= 1 {
                // Ordinary king step.
            } else if dr == 0 && dc.abs() == 2 {
                effect.rook_shift = Some(castle(board, mover, dc > 0, rights)?);
            } else {
                return Err(RuleViolation::IllegalDestination);
            }
        }
    }
    Ok(effect)
}

/// Validates castling and returns the rook relocation. `kingside` follows
/// the king's travel direction (towards the h-file).
fn castle(
    board: &Board,
    mover: Role,
    kingside: bool,
    rights: &CastlingRights,
) -> Result<(Square, Square), RuleViolation> {
    let home = match mover {
        Role::White => 7,
        Role::Black => 0,
    };
    let allowed = if kingside {
        rights.kingside(mover)
    } else {
        rights.queenside(mover)
    };
    if !allowed {
        return Err(RuleViolation::CastlingUnavailable);
    }
    let king_home = Square::new(home, 4);
    if board.get(king_home) != Some(Piece::new(mover, PieceKind::King)) {
        return Err(RuleViolation::CastlingUnavailable);
    }
    let (rook_col, empty_cols, king_path): (u8, &[u8], &[u8]) = if kingside {
        (7, &[5, 6], &[5, 6])
    } else {
        (0, &[1, 2, 3], &[2, 3])
    };
    if board.get(Square::new(home, rook_col)) != Some(Piece::new(mover, PieceKind::Rook)) {
        return Err(RuleViolation::CastlingUnavailable);
    }
    if empty_cols
        .iter()
        .any(|&col| board.get(Square::new(home, col)).is_some())
    {
        return Err(RuleViolation::Blocked);
    }
    let enemy = mover.opponent();
    if square_attacked(board, king_home, enemy)
        || king_path
            .iter()
            .any(|&col| square_attacked(board, Square::new(home, col), enemy))
    {
        return Err(RuleViolation::IntoCheck);
    }
    let rook_from = Square::new(home, rook_col);
    let rook_to = Square::new(home, if kingside { 5 } else { 3 });
    Ok((rook_from, rook_to))
}

fn clear_path(board: &Board, from: Square, to: Square) -> Result<(), RuleViolation> {
    let dr = (to.row as i8 - from.row as i8).signum();
    let dc = (to.col as i8 - from.col as i8).signum();
    let mut row = from.row as i8 + dr;
    let mut col = from.col as i8 + dc;
    while (row, col) != (to.row as i8, to.col as i8) {
        if board.get(Square::new(row as u8, col as u8)).is_some() {
            return Err(RuleViolation::Blocked);
        }
        row += dr;
        col += dc;
    }
    Ok(())
}

/// True if any piece of `by` attacks `target` on the current board.
fn square_attacked(board: &Board, target: Square, by: Role) -> bool {
    Board::squares().any(|from| {
        let Some(piece) = board.get(from) else {
            return false;
        };
        if piece.role != by || from == target {
            return false;
        }
        let dr = target.row as i8 - from.row as i8;
        let dc = target.col as i8 - from.col as i8;
        match piece.kind {
            PieceKind::Pawn => {
                let dir = match by {
                    Role::White => -1,
                    Role::Black => 1,
                };
                dr == dir && dc.abs() == 1
            }
            PieceKind::Knight => matches!((dr.abs(), dc.abs()), (1, 2) | (2, 1)),
            PieceKind::King => dr.abs() <= 1 && dc.abs() <= 1,
            PieceKind::Bishop => dr.abs() == dc.abs() && clear_path(board, from, target).is_ok(),
            PieceKind::Rook => (dr == 0 || dc == 0) && clear_path(board, from, target).is_ok(),
            PieceKind::Queen => {
                (dr == 0 || dc == 0 || dr.abs() == dc.abs())
                    && clear_path(board, from, target).is_ok()
            }
        }
    })
}

fn in_check(board: &Board, role: Role) -> bool {
    board
        .find(Piece::new(role, PieceKind::King))
        .map(|king| square_attacked(board, king, role.opponent()))
        .unwrap_or(false)
}

/// Whether `role` has any legal move. Castling is skipped: whenever castling
/// is legal the underlying one-square king step is legal too, so it cannot
/// be the only escape. En passant can be, so it is included.
fn has_any_legal_move(board: &Board, role: Role, en_passant: Option<Square>) -> bool {
    let rights = CastlingRights::default();
    let promo_row = match role {
        Role::White => 0,
        Role::Black => 7,
    };
    Board::squares()
        .filter(|&from| board.get(from).map(|p| p.role) == Some(role))
        .any(|from| {
            Board::squares().any(|to| {
                let promotion = (board.get(from).map(|p| p.kind) == Some(PieceKind::Pawn)
                    && to.row == promo_row)
                    .then_some(PieceKind::Queen);
                let mv = ChessMove {
                    from,
                    to,
                    promotion,
                };
                let Ok(effect) = move_effect(board, role, mv, en_passant, &rights) else {
                    return false;
                };
                if effect.rook_shift.is_some() {
                    return false;
                }
                let mut next = board.clone();
                if let Some(sq) = effect.captured {
                    next.set(sq, None);
                }
                let piece = next.get(from);
                next.set(from, None);
                next.set(to, piece);
                !in_check(&next, role)
            })
        })
}

fn update_rights(
    rights: &mut CastlingRights,
    mover: Role,
    piece: Piece,
    mv: ChessMove,
    captured: Option<Square>,
    captured_piece: Option<Piece>,
) {
    let home = match mover {
        Role::White => 7,
        Role::Black => 0,
    };
    match piece.kind {
        PieceKind::King => rights.revoke_all(mover),
        PieceKind::Rook if mv.from == Square::new(home, 0) => rights.revoke_queenside(mover),
        PieceKind::Rook if mv.from == Square::new(home, 7) => rights.revoke_kingside(mover),
        _ => {}
    }
    // Capturing an unmoved rook removes the opponent's right on that wing.
    if let (Some(sq), Some(taken)) = (captured, captured_piece) {
        if taken.kind == PieceKind::Rook {
            let enemy = mover.opponent();
            let enemy_home = match enemy {
                Role::White => 7,
                Role::Black => 0,
            };
            if sq == Square::new(enemy_home, 0) {
                rights.revoke_queenside(enemy);
            } else if sq == Square::new(enemy_home, 7) {
                rights.revoke_kingside(enemy);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chess_move(from: (u8, u8), to: (u8, u8)) -> MoveData {
        MoveData::Chess(ChessMove::new(
            Square::new(from.0, from.1),
            Square::new(to.0, to.1),
        ))
    }

    fn play(position: Position, moves: &[((u8, u8), (u8, u8))]) -> Position {
        let mut position = position;
        for &(from, to) in moves {
            let mover = position.turn;
            position = Chess
                .apply(&position, mover, &chess_move(from, to))
                .expect("legal move");
        }
        position
    }

    fn empty_board() -> Board {
        Board([[None; 8]; 8])
    }

    #[test]
    fn double_pawn_push_sets_en_passant_target() {
        let start = Position::initial(&GameKind::Chess);
        let after = play(start, &[((6, 4), (4, 4))]);
        assert_eq!(after.turn, Role::Black);
        assert_eq!(after.en_passant, Some(Square::new(5, 4)));
        assert!(!after.game_over);
        let last = after.last_move.expect("last move recorded");
        assert_eq!(last.piece, Piece::new(Role::White, PieceKind::Pawn));
        assert_eq!(last.to, Square::new(4, 4));
    }

    #[test]
    fn single_push_clears_en_passant_target() {
        let start = Position::initial(&GameKind::Chess);
        let after = play(start, &[((6, 4), (4, 4)), ((1, 0), (2, 0))]);
        assert_eq!(after.en_passant, None);
    }

    #[test]
    fn blocked_rook_is_rejected() {
        let start = Position::initial(&GameKind::Chess);
        let err = Chess
            .apply(&start, Role::White, &chess_move((7, 0), (4, 0)))
            .unwrap_err();
        assert_eq!(err, RuleViolation::Blocked);
    }

    #[test]
    fn moving_the_opponents_piece_is_rejected() {
        let start = Position::initial(&GameKind::Chess);
        let err = Chess
            .apply(&start, Role::White, &chess_move((1, 4), (2, 4)))
            .unwrap_err();
        assert_eq!(err, RuleViolation::NotYourPiece);
    }

    #[test]
    fn capture_increments_the_movers_counter() {
        let start = Position::initial(&GameKind::Chess);
        // 1. e4 d5 2. exd5
        let after = play(start, &[((6, 4), (4, 4)), ((1, 3), (3, 3)), ((4, 4), (3, 3))]);
        assert_eq!(after.white_captures, 1);
        assert_eq!(after.black_captures, 0);
        match &after.board {
            Snapshot::Chess(board) => {
                assert_eq!(
                    board.get(Square::new(3, 3)),
                    Some(Piece::new(Role::White, PieceKind::Pawn))
                );
            }
            Snapshot::Generic(_) => panic!("expected a chess board"),
        }
    }

    #[test]
    fn en_passant_capture_removes_the_bypassing_pawn() {
        let start = Position::initial(&GameKind::Chess);
        // 1. e4 a6 2. e5 d5 3. exd6 e.p.
        let after = play(
            start,
            &[
                ((6, 4), (4, 4)),
                ((1, 0), (2, 0)),
                ((4, 4), (3, 4)),
                ((1, 3), (3, 3)),
                ((3, 4), (2, 3)),
            ],
        );
        assert_eq!(after.white_captures, 1);
        match &after.board {
            Snapshot::Chess(board) => {
                assert_eq!(board.get(Square::new(3, 3)), None);
                assert_eq!(
                    board.get(Square::new(2, 3)),
                    Some(Piece::new(Role::White, PieceKind::Pawn))
                );
            }
            Snapshot::Generic(_) => panic!("expected a chess board"),
        }
    }

    #[test]
    fn kingside_castling_moves_both_king_and_rook() {
        let mut board = Board::initial();
        // Clear f1 and g1.
        board.set(Square::new(7, 5), None);
        board.set(Square::new(7, 6), None);
        let position = Position {
            board: Snapshot::Chess(board),
            ..Position::initial(&GameKind::Chess)
        };
        let after = Chess
            .apply(&position, Role::White, &chess_move((7, 4), (7, 6)))
            .expect("castling is legal");
        match &after.board {
            Snapshot::Chess(board) => {
                assert_eq!(
                    board.get(Square::new(7, 6)),
                    Some(Piece::new(Role::White, PieceKind::King))
                );
                assert_eq!(
                    board.get(Square::new(7, 5)),
                    Some(Piece::new(Role::White, PieceKind::Rook))
                );
                assert_eq!(board.get(Square::new(7, 4)), None);
                assert_eq!(board.get(Square::new(7, 7)), None);
            }
            Snapshot::Generic(_) => panic!("expected a chess board"),
        }
        let rights = after.castling.expect("rights present");
        assert!(!rights.white_king);
        assert!(!rights.white_queen);
        assert!(rights.black_king);
    }

    #[test]
    fn castling_without_rights_is_rejected() {
        let mut board = Board::initial();
        board.set(Square::new(7, 5), None);
        board.set(Square::new(7, 6), None);
        let mut position = Position {
            board: Snapshot::Chess(board),
            ..Position::initial(&GameKind::Chess)
        };
        let mut rights = CastlingRights::default();
        rights.revoke_kingside(Role::White);
        position.castling = Some(rights);
        let err = Chess
            .apply(&position, Role::White, &chess_move((7, 4), (7, 6)))
            .unwrap_err();
        assert_eq!(err, RuleViolation::CastlingUnavailable);
    }

    #[test]
    fn a_move_exposing_the_own_king_is_rejected() {
        let mut board = empty_board();
        board.set(Square::new(7, 4), Some(Piece::new(Role::White, PieceKind::King)));
        board.set(Square::new(6, 4), Some(Piece::new(Role::White, PieceKind::Rook)));
        board.set(Square::new(1, 4), Some(Piece::new(Role::Black, PieceKind::Rook)));
        board.set(Square::new(0, 0), Some(Piece::new(Role::Black, PieceKind::King)));
        let position = Position {
            board: Snapshot::Chess(board),
            castling: None,
            ..Position::initial(&GameKind::Chess)
        };
        // Moving the pinned rook off the e-file leaves the king in check.
        let err = Chess
            .apply(&position, Role::White, &chess_move((6, 4), (6, 0)))
            .unwrap_err();
        assert_eq!(err, RuleViolation::IntoCheck);
    }

    #[test]
    fn fools_mate_is_detected_as_checkmate() {
        let start = Position::initial(&GameKind::Chess);
        // 1. f3 e5 2. g4 Qh4#
        let after = play(
            start,
            &[
                ((6, 5), (5, 5)),
                ((1, 4), (3, 4)),
                ((6, 6), (4, 6)),
                ((0, 3), (4, 7)),
            ],
        );
        assert!(after.game_over);
        assert_eq!(after.winner, Some(Role::Black));
    }

    #[test]
    fn stalemate_ends_the_game_with_no_winner() {
        let mut board = empty_board();
        board.set(Square::new(0, 0), Some(Piece::new(Role::Black, PieceKind::King)));
        board.set(Square::new(1, 3), Some(Piece::new(Role::White, PieceKind::Queen)));
        board.set(Square::new(2, 1), Some(Piece::new(Role::White, PieceKind::King)));
        let position = Position {
            board: Snapshot::Chess(board),
            castling: None,
            ..Position::initial(&GameKind::Chess)
        };
        let after = Chess
            .apply(&position, Role::White, &chess_move((1, 3), (1, 2)))
            .expect("legal queen move");
        assert!(after.game_over);
        assert_eq!(after.winner, None);
    }

    #[test]
    fn promotion_is_required_on_the_last_rank() {
        let mut board = empty_board();
        board.set(Square::new(1, 0), Some(Piece::new(Role::White, PieceKind::Pawn)));
        board.set(Square::new(7, 4), Some(Piece::new(Role::White, PieceKind::King)));
        board.set(Square::new(3, 7), Some(Piece::new(Role::Black, PieceKind::King)));
        let position = Position {
            board: Snapshot::Chess(board),
            castling: None,
            ..Position::initial(&GameKind::Chess)
        };
        let err = Chess
            .apply(&position, Role::White, &chess_move((1, 0), (0, 0)))
            .unwrap_err();
        assert_eq!(err, RuleViolation::BadPromotion);

        let promoted = Chess
            .apply(
                &position,
                Role::White,
                &MoveData::Chess(ChessMove::promoting(
                    Square::new(1, 0),
                    Square::new(0, 0),
                    PieceKind::Queen,
                )),
            )
            .expect("promotion is legal");
        match &promoted.board {
            Snapshot::Chess(board) => assert_eq!(
                board.get(Square::new(0, 0)),
                Some(Piece::new(Role::White, PieceKind::Queen))
            ),
            Snapshot::Generic(_) => panic!("expected a chess board"),
        }
    }

    #[test]
    fn generic_payloads_are_rejected() {
        let start = Position::initial(&GameKind::Chess);
        let err = Chess
            .apply(
                &start,
                Role::White,
                &MoveData::Generic(ijson_null()),
            )
            .unwrap_err();
        assert_eq!(err, RuleViolation::WrongKind);
    }

    fn ijson_null() -> ijson::IValue {
        ijson::IValue::NULL
    }
}
