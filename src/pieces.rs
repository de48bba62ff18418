//! Piece catalog: the three block templates and where the next one comes from.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Block templates (2x2 square, 2-tall bar, single dot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PieceKind {
    Square,
    Bar,
    Dot,
}

impl PieceKind {
    pub const ALL: [Self; 3] = [Self::Square, Self::Bar, Self::Dot];

    /// Cells relative to the origin (top-left); each (dx, dy), dy grows downwards.
    pub fn cells(&self) -> &'static [(i32, i32)] {
        match self {
            Self::Square => &[(0, 0), (1, 0), (0, 1), (1, 1)],
            Self::Bar => &[(0, 0), (0, 1)],
            Self::Dot => &[(0, 0)],
        }
    }

    /// Bounding box width in cells.
    pub fn width(&self) -> u16 {
        match self {
            Self::Square => 2,
            Self::Bar | Self::Dot => 1,
        }
    }

    /// Bounding box height in cells.
    pub fn height(&self) -> u16 {
        match self {
            Self::Square | Self::Bar => 2,
            Self::Dot => 1,
        }
    }

    /// Label as rows x columns.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Square => "2x2",
            Self::Bar => "2x1",
            Self::Dot => "1x1",
        }
    }
}

/// Supplies the template for each spawn.
pub trait PieceSource: std::fmt::Debug {
    fn next_kind(&mut self) -> PieceKind;
}

/// Uniform pick over [`PieceKind::ALL`].
#[derive(Debug, Clone)]
pub struct RandomPieces {
    rng: StdRng,
}

impl RandomPieces {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }
}

impl Default for RandomPieces {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PieceSource for RandomPieces {
    fn next_kind(&mut self) -> PieceKind {
        PieceKind::ALL[self.rng.gen_range(0..PieceKind::ALL.len())]
    }
}

/// Cycles through a fixed list. Falls back to `Dot` when the list is empty.
#[derive(Debug, Clone)]
pub struct SequencePieces {
    kinds: Vec<PieceKind>,
    index: usize,
}

impl SequencePieces {
    pub fn new(kinds: Vec<PieceKind>) -> Self {
        Self { kinds, index: 0 }
    }
}

impl PieceSource for SequencePieces {
    fn next_kind(&mut self) -> PieceKind {
        if self.kinds.is_empty() {
            return PieceKind::Dot;
        }
        let kind = self.kinds[self.index % self.kinds.len()];
        self.index = self.index.wrapping_add(1);
        kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_matches_footprint() {
        for kind in PieceKind::ALL {
            let cells = kind.cells();
            assert!(cells.iter().all(|&(dx, dy)| dx >= 0 && dy >= 0));
            let w = cells.iter().map(|c| c.0).max().unwrap() + 1;
            let h = cells.iter().map(|c| c.1).max().unwrap() + 1;
            assert_eq!(w, i32::from(kind.width()), "{:?}", kind);
            assert_eq!(h, i32::from(kind.height()), "{:?}", kind);
            assert_eq!(format!("{}x{}", kind.height(), kind.width()), kind.name());
        }
    }

    #[test]
    fn test_cell_counts() {
        assert_eq!(PieceKind::Square.cells().len(), 4);
        assert_eq!(PieceKind::Bar.cells().len(), 2);
        assert_eq!(PieceKind::Dot.cells().len(), 1);
    }

    #[test]
    fn test_seeded_random_is_reproducible() {
        let mut a = RandomPieces::new(Some(7));
        let mut b = RandomPieces::new(Some(7));
        for _ in 0..50 {
            assert_eq!(a.next_kind(), b.next_kind());
        }
    }

    #[test]
    fn test_random_draws_every_kind() {
        let mut source = RandomPieces::new(Some(42));
        let mut counts = [0u32; 3];
        for _ in 0..3000 {
            let i = PieceKind::ALL
                .iter()
                .position(|k| *k == source.next_kind())
                .unwrap();
            counts[i] += 1;
        }
        // 1/3 each; generous bounds keep this stable for any seed.
        for c in counts {
            assert!((800..1200).contains(&c), "counts {:?}", counts);
        }
    }

    #[test]
    fn test_sequence_cycles() {
        let mut s = SequencePieces::new(vec![PieceKind::Bar, PieceKind::Square]);
        assert_eq!(s.next_kind(), PieceKind::Bar);
        assert_eq!(s.next_kind(), PieceKind::Square);
        assert_eq!(s.next_kind(), PieceKind::Bar);
    }

    #[test]
    fn test_empty_sequence_yields_dot() {
        let mut s = SequencePieces::new(Vec::new());
        assert_eq!(s.next_kind(), PieceKind::Dot);
    }
}
