//! Initiative roll formulas and a seeded dice roller
//!
//! The engine only ever asks for a total through [`RollService`]. The
//! formula type keeps the request typed; [`SeededDice`] is the reference
//! roller used by the CLI and tests.

use crate::core::error::{GroupError, Result};
use crate::host::RollService;
use async_trait::async_trait;
use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

/// Which dice of a pool count towards the total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Keep {
    All,
    Highest,
    Lowest,
}

/// A dice pool plus a flat modifier, e.g. `2d20kh + 3`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollFormula {
    pub dice: u32,
    pub sides: u32,
    pub keep: Keep,
    pub modifier: f64,
}

impl RollFormula {
    pub fn d20(modifier: f64) -> Self {
        Self {
            dice: 1,
            sides: 20,
            keep: Keep::All,
            modifier,
        }
    }

    /// Total for a set of face values already rolled
    pub fn total(&self, faces: &[u32]) -> f64 {
        let kept: u32 = match self.keep {
            Keep::All => faces.iter().sum(),
            Keep::Highest => faces.iter().copied().max().unwrap_or(0),
            Keep::Lowest => faces.iter().copied().min().unwrap_or(0),
        };
        kept as f64 + self.modifier
    }
}

impl fmt::Display for RollFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.dice, self.sides)?;
        match self.keep {
            Keep::All => {}
            Keep::Highest => f.write_str("kh")?,
            Keep::Lowest => f.write_str("kl")?,
        }
        if self.modifier < 0.0 {
            write!(f, " - {}", -self.modifier)
        } else {
            write!(f, " + {}", self.modifier)
        }
    }
}

/// How a group roll is made
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollMode {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl RollMode {
    /// Pick the mode from held modifier keys (alt = advantage, ctrl/meta = disadvantage)
    pub fn from_keys(alt: bool, ctrl_or_meta: bool) -> Self {
        if alt {
            RollMode::Advantage
        } else if ctrl_or_meta {
            RollMode::Disadvantage
        } else {
            RollMode::Normal
        }
    }

    pub fn formula(&self, modifier: f64) -> RollFormula {
        match self {
            RollMode::Normal => RollFormula::d20(modifier),
            RollMode::Advantage => RollFormula {
                dice: 2,
                sides: 20,
                keep: Keep::Highest,
                modifier,
            },
            RollMode::Disadvantage => RollFormula {
                dice: 2,
                sides: 20,
                keep: Keep::Lowest,
                modifier,
            },
        }
    }
}

/// Deterministic roller backed by ChaCha8
pub struct SeededDice {
    rng: Mutex<ChaCha8Rng>,
}

impl SeededDice {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }
}

#[async_trait]
impl RollService for SeededDice {
    async fn roll(&self, formula: &RollFormula) -> Result<f64> {
        if formula.dice == 0 || formula.sides == 0 {
            return Err(GroupError::Roll(format!("empty dice pool: {}", formula)));
        }
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| GroupError::Roll("dice state poisoned".into()))?;
        let faces: Vec<u32> = (0..formula.dice)
            .map(|_| rng.gen_range(1..=formula.sides))
            .collect();
        Ok(formula.total(&faces))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula_display() {
        assert_eq!(RollMode::Normal.formula(2.0).to_string(), "1d20 + 2");
        assert_eq!(RollMode::Advantage.formula(3.0).to_string(), "2d20kh + 3");
        assert_eq!(RollMode::Disadvantage.formula(-1.0).to_string(), "2d20kl - 1");
    }

    #[test]
    fn test_keep_highest_and_lowest() {
        let adv = RollMode::Advantage.formula(1.0);
        let dis = RollMode::Disadvantage.formula(1.0);
        assert_eq!(adv.total(&[4, 17]), 18.0);
        assert_eq!(dis.total(&[4, 17]), 5.0);
    }

    #[test]
    fn test_mode_from_keys() {
        assert_eq!(RollMode::from_keys(true, false), RollMode::Advantage);
        assert_eq!(RollMode::from_keys(false, true), RollMode::Disadvantage);
        assert_eq!(RollMode::from_keys(false, false), RollMode::Normal);
    }

    #[tokio::test]
    async fn test_seeded_dice_in_range_and_repeatable() {
        let a = SeededDice::new(7);
        let b = SeededDice::new(7);
        let formula = RollFormula::d20(2.0);
        for _ in 0..20 {
            let x = a.roll(&formula).await.unwrap();
            let y = b.roll(&formula).await.unwrap();
            assert_eq!(x, y);
            assert!((3.0..=22.0).contains(&x));
        }
    }

    #[tokio::test]
    async fn test_empty_pool_is_roll_error() {
        let dice = SeededDice::new(1);
        let formula = RollFormula {
            dice: 0,
            sides: 20,
            keep: Keep::All,
            modifier: 0.0,
        };
        assert!(matches!(dice.roll(&formula).await, Err(GroupError::Roll(_))));
    }
}
