//! OpusOthello - Selectivity Module
//!
//! Maps a difficulty level and the number of empty squares to a target
//! search depth and a selectivity band, and derives the pruning knobs the
//! search uses from that band. Everything here is a pure function of its
//! inputs.

/// Highest difficulty level
pub const MAX_LEVEL: u8 = 10;

/// Level used when a request does not name one
pub const DEFAULT_LEVEL: u8 = 6;

/// Midgame depth, exact-solve threshold and base selectivity per level
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelSettings {
    pub mid_depth: u8,
    pub end_depth: u8,
    pub selectivity: u8,
}

const LEVELS: [LevelSettings; MAX_LEVEL as usize + 1] = [
    LevelSettings { mid_depth: 1, end_depth: 4, selectivity: 0 },
    LevelSettings { mid_depth: 2, end_depth: 6, selectivity: 0 },
    LevelSettings { mid_depth: 3, end_depth: 8, selectivity: 1 },
    LevelSettings { mid_depth: 4, end_depth: 10, selectivity: 1 },
    LevelSettings { mid_depth: 5, end_depth: 12, selectivity: 2 },
    LevelSettings { mid_depth: 6, end_depth: 14, selectivity: 2 },
    LevelSettings { mid_depth: 8, end_depth: 16, selectivity: 3 },
    LevelSettings { mid_depth: 10, end_depth: 18, selectivity: 3 },
    LevelSettings { mid_depth: 12, end_depth: 20, selectivity: 4 },
    LevelSettings { mid_depth: 14, end_depth: 22, selectivity: 4 },
    LevelSettings { mid_depth: 18, end_depth: 24, selectivity: 5 },
];

/// Level table entry, clamping out-of-range levels
pub fn level_settings(level: u8) -> LevelSettings {
    LEVELS[level.min(MAX_LEVEL) as usize]
}

/// Pruning aggressiveness: 0 prunes hardest, 5 prunes nothing
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Selectivity(u8);

impl Selectivity {
    pub const AGGRESSIVE: Selectivity = Selectivity(0);
    pub const NONE: Selectivity = Selectivity(5);

    pub fn new(value: u8) -> Self {
        Selectivity(value.min(Self::NONE.0))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// One band less aggressive
    pub fn relaxed(self) -> Self {
        Selectivity::new(self.0 + 1)
    }

    pub fn params(self) -> PruningParams {
        PRUNING[self.0 as usize]
    }
}

/// Knobs consumed by the search
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PruningParams {
    /// Base late-move reduction in plies; 0 disables LMR
    pub lmr_base: i32,
    /// Extra moves allowed before late-move pruning kicks in; `None` disables LMP
    pub lmp_bonus: Option<usize>,
    /// Futility margin per remaining ply; `None` disables futility pruning
    pub futility_margin: Option<i32>,
    /// Razoring margin per remaining ply; `None` disables razoring
    pub razor_margin: Option<i32>,
    /// Scout non-first moves with a null window before a full re-search
    pub use_nws: bool,
    /// Allow a shallow search to stand in for a deep one when calm
    pub stability_reduction: bool,
}

const PRUNING: [PruningParams; 6] = [
    PruningParams {
        lmr_base: 2,
        lmp_bonus: Some(0),
        futility_margin: Some(60),
        razor_margin: Some(120),
        // Band 0 runs without scouts; PVS nodes apply late-move and futility
        // pruning to every non-first move instead
        use_nws: false,
        stability_reduction: true,
    },
    PruningParams {
        lmr_base: 2,
        lmp_bonus: Some(1),
        futility_margin: Some(80),
        razor_margin: Some(160),
        use_nws: true,
        stability_reduction: true,
    },
    PruningParams {
        lmr_base: 1,
        lmp_bonus: Some(2),
        futility_margin: Some(110),
        razor_margin: Some(220),
        use_nws: true,
        stability_reduction: true,
    },
    PruningParams {
        lmr_base: 1,
        lmp_bonus: Some(4),
        futility_margin: Some(150),
        razor_margin: Some(300),
        use_nws: true,
        stability_reduction: false,
    },
    PruningParams {
        lmr_base: 1,
        lmp_bonus: Some(8),
        futility_margin: Some(220),
        razor_margin: None,
        use_nws: true,
        stability_reduction: false,
    },
    PruningParams {
        lmr_base: 0,
        lmp_bonus: None,
        futility_margin: None,
        razor_margin: None,
        use_nws: true,
        stability_reduction: false,
    },
];

/// Late-move pruning move counts indexed by remaining depth
pub const LMP_COUNTS: [usize; 6] = [0, 3, 4, 6, 8, 11];

/// Target depth and selectivity for one search
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchPlan {
    pub depth: u8,
    pub selectivity: Selectivity,
    /// Depth equals the number of empties: the search solves the game
    pub exact: bool,
}

/// Plan a search at `level` for a position with `empties` empty squares.
///
/// At or below the level's endgame threshold the depth is forced to exactly
/// the number of empties and pruning is switched off. Just above the
/// threshold the selectivity is relaxed by one band.
pub fn search_plan(level: u8, empties: u32) -> SearchPlan {
    let settings = level_settings(level);
    let empties = empties.min(60) as u8;

    if empties <= settings.end_depth {
        return SearchPlan {
            depth: empties,
            selectivity: Selectivity::NONE,
            exact: true,
        };
    }

    let mut selectivity = Selectivity::new(settings.selectivity);
    if empties <= settings.end_depth + 6 {
        selectivity = selectivity.relaxed();
    }

    SearchPlan {
        depth: settings.mid_depth.min(empties),
        selectivity,
        exact: false,
    }
}
