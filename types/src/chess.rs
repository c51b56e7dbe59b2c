use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::Role;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl PieceKind {
    pub fn code(self) -> char {
        match self {
            Self::Pawn => 'P',
            Self::Knight => 'N',
            Self::Bishop => 'B',
            Self::Rook => 'R',
            Self::Queen => 'Q',
            Self::King => 'K',
        }
    }
    pub fn from_code(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'P' => Some(Self::Pawn),
            'N' => Some(Self::Knight),
            'B' => Some(Self::Bishop),
            'R' => Some(Self::Rook),
            'Q' => Some(Self::Queen),
            'K' => Some(Self::King),
            _ => None,
        }
    }
}

impl Serialize for PieceKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut buf = [0u8; 4];
        serializer.serialize_str(self.code().encode_utf8(&mut buf))
    }
}

impl<'de> Deserialize<'de> for PieceKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        single_char(&s)
            .and_then(Self::from_code)
            .ok_or_else(|| de::Error::custom(format!("unknown piece kind {s:?}")))
    }
}

/// A piece on the board, wire-encoded as the original single-letter code:
/// uppercase for white ("P", "N", ...), lowercase for black ("p", "n", ...).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Piece {
    pub role: Role,
    pub kind: PieceKind,
}

impl Piece {
    pub fn new(role: Role, kind: PieceKind) -> Self {
        Self { role, kind }
    }
    pub fn code(self) -> char {
        match self.role {
            Role::White => self.kind.code(),
            Role::Black => self.kind.code().to_ascii_lowercase(),
        }
    }
    pub fn from_code(c: char) -> Option<Self> {
        let role = if c.is_ascii_uppercase() {
            Role::White
        } else {
            Role::Black
        };
        PieceKind::from_code(c).map(|kind| Self { role, kind })
    }
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl Serialize for Piece {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut buf = [0u8; 4];
        serializer.serialize_str(self.code().encode_utf8(&mut buf))
    }
}

impl<'de> Deserialize<'de> for Piece {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        single_char(&s)
            .and_then(Self::from_code)
            .ok_or_else(|| de::Error::custom(format!("unknown piece code {s:?}")))
    }
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

/// Zero-based board coordinates; row 0 is black's back rank, matching the
/// stored board matrix orientation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Square {
    pub row: u8,
    pub col: u8,
}

impl Square {
    pub fn new(row: u8, col: u8) -> Self {
        Self { row, col }
    }
    pub fn on_board(self) -> bool {
        self.row < 8 && self.col < 8
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = (b'a' + self.col) as char;
        let rank = 8 - self.row;
        write!(f, "{file}{rank}")
    }
}

/// 8x8 matrix of optional pieces; empty squares serialize as JSON null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board(pub [[Option<Piece>; 8]; 8]);

impl Board {
    /// Standard chess starting position.
    pub fn initial() -> Self {
        use PieceKind::*;
        const BACK: [PieceKind; 8] = [Rook, Knight, Bishop, Queen, King, Bishop, Knight, Rook];
        let mut cells: [[Option<Piece>; 8]; 8] = [[None; 8]; 8];
        for (col, &kind) in BACK.iter().enumerate() {
            cells[0][col] = Some(Piece::new(Role::Black, kind));
            cells[1][col] = Some(Piece::new(Role::Black, Pawn));
            cells[6][col] = Some(Piece::new(Role::White, Pawn));
            cells[7][col] = Some(Piece::new(Role::White, kind));
        }
        Self(cells)
    }
    pub fn get(&self, sq: Square) -> Option<Piece> {
        self.0[sq.row as usize][sq.col as usize]
    }
    pub fn set(&mut self, sq: Square, piece: Option<Piece>) {
        self.0[sq.row as usize][sq.col as usize] = piece;
    }
    pub fn squares() -> impl Iterator<Item = Square> {
        (0..8u8).flat_map(|row| (0..8u8).map(move |col| Square { row, col }))
    }
    pub fn find(&self, piece: Piece) -> Option<Square> {
        Self::squares().find(|&sq| self.get(sq) == Some(piece))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastlingRights {
    #[serde(rename = "wK")]
    pub white_king: bool,
    #[serde(rename = "wQ")]
    pub white_queen: bool,
    #[serde(rename = "bK")]
    pub black_king: bool,
    #[serde(rename = "bQ")]
    pub black_queen: bool,
}

impl Default for CastlingRights {
    fn default() -> Self {
        Self {
            white_king: true,
            white_queen: true,
            black_king: true,
            black_queen: true,
        }
    }
}

impl CastlingRights {
    pub fn kingside(&self, role: Role) -> bool {
        match role {
            Role::White => self.white_king,
            Role::Black => self.black_king,
        }
    }
    pub fn queenside(&self, role: Role) -> bool {
        match role {
            Role::White => self.white_queen,
            Role::Black => self.black_queen,
        }
    }
    pub fn revoke_all(&mut self, role: Role) {
        self.revoke_kingside(role);
        self.revoke_queenside(role);
    }
    pub fn revoke_kingside(&mut self, role: Role) {
        match role {
            Role::White => self.white_king = false,
            Role::Black => self.black_king = false,
        }
    }
    pub fn revoke_queenside(&mut self, role: Role) {
        match role {
            Role::White => self.white_queen = false,
            Role::Black => self.black_queen = false,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMove {
    pub from: Square,
    pub to: Square,
    pub piece: Piece,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChessMove {
    pub from: Square,
    pub to: Square,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<PieceKind>,
}

impl ChessMove {
    pub fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: None,
        }
    }
    pub fn promoting(from: Square, to: Square, kind: PieceKind) -> Self {
        Self {
            from,
            to,
            promotion: Some(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_board_matches_stored_matrix_encoding() {
        let expected = serde_json::json!([
            ["r", "n", "b", "q", "k", "b", "n", "r"],
            ["p", "p", "p", "p", "p", "p", "p", "p"],
            [null, null, null, null, null, null, null, null],
            [null, null, null, null, null, null, null, null],
            [null, null, null, null, null, null, null, null],
            [null, null, null, null, null, null, null, null],
            ["P", "P", "P", "P", "P", "P", "P", "P"],
            ["R", "N", "B", "Q", "K", "B", "N", "R"]
        ]);
        let actual = serde_json::to_value(Board::initial()).unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn board_round_trips_with_null_cells() {
        let board = Board::initial();
        let text = serde_json::to_string(&board).unwrap();
        let back: Board = serde_json::from_str(&text).unwrap();
        assert_eq!(back, board);
    }

    #[test]
    fn castling_rights_use_legacy_keys() {
        let rights = CastlingRights::default();
        let value = serde_json::to_value(rights).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "wK": true, "wQ": true, "bK": true, "bQ": true })
        );
    }

    #[test]
    fn piece_codes_are_case_sensitive_by_colour() {
        let white_pawn = Piece::from_code('P').unwrap();
        assert_eq!(white_pawn.role, Role::White);
        let black_knight = Piece::from_code('n').unwrap();
        assert_eq!(black_knight.role, Role::Black);
        assert_eq!(black_knight.kind, PieceKind::Knight);
        assert_eq!(serde_json::to_string(&black_knight).unwrap(), "\"n\"");
        assert!(Piece::from_code('x').is_none());
    }

    #[test]
    fn promotion_field_is_absent_when_none() {
        let mv = ChessMove::new(Square::new(6, 4), Square::new(4, 4));
        let value = serde_json::to_value(mv).unwrap();
        assert!(value.get("promotion").is_none());
        let promo = ChessMove::promoting(Square::new(1, 0), Square::new(0, 0), PieceKind::Queen);
        assert_eq!(
            serde_json::to_value(promo).unwrap()["promotion"],
            serde_json::json!("Q")
        );
    }

    #[test]
    fn squares_display_in_algebraic_notation() {
        assert_eq!(Square::new(7, 0).to_string(), "a1");
        assert_eq!(Square::new(0, 7).to_string(), "h8");
        assert_eq!(Square::new(4, 4).to_string(), "e4");
    }
}
