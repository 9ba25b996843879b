//! Dice notation parsing and rolling.
//!
//! Supports standard notation like "1d20+5", "2d6-1", "d100". The die size
//! set is fixed to the physical dice a table actually owns; anything else is
//! rejected at parse time. All rolling functions take an injected `Rng` so
//! callers (and tests) control the entropy source.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Die sizes accepted in notation.
pub const VALID_SIDES: [u32; 7] = [4, 6, 8, 10, 12, 20, 100];

/// Maximum number of dice in a single roll.
pub const MAX_DICE_COUNT: u32 = 100;

/// Error when parsing a dice notation string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceParseError {
    /// The notation string is empty
    #[error("Empty dice notation")]
    Empty,
    /// Invalid format - expected XdY or XdY+Z
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    /// Die size outside the supported set
    #[error("Invalid die type: d{0}. Valid types: d4, d6, d8, d10, d12, d20, d100")]
    InvalidDieSize(u32),
    /// Dice count outside 1..=100
    #[error("Dice count must be between 1 and 100: {0}")]
    InvalidDiceCount(u32),
}

/// A parsed dice notation like "2d6+3"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceNotation {
    /// Number of dice to roll (X in XdY)
    pub count: u32,
    /// Size of each die (Y in XdY)
    pub sides: u32,
    /// Modifier added after rolling (+Z or -Z)
    pub modifier: i32,
}

impl DiceNotation {
    pub fn new(count: u32, sides: u32, modifier: i32) -> Result<Self, DiceParseError> {
        if count < 1 || count > MAX_DICE_COUNT {
            return Err(DiceParseError::InvalidDiceCount(count));
        }
        if !VALID_SIDES.contains(&sides) {
            return Err(DiceParseError::InvalidDieSize(sides));
        }
        Ok(Self {
            count,
            sides,
            modifier,
        })
    }

    /// Parse a notation string like "1d20+5", "2d6-1", "d100".
    ///
    /// A missing count means 1. Whitespace is ignored. Parsed manually to
    /// keep the domain layer regex-free.
    pub fn parse(input: &str) -> Result<Self, DiceParseError> {
        let input: String = input
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        if input.is_empty() {
            return Err(DiceParseError::Empty);
        }

        let d_pos = input
            .find('d')
            .ok_or_else(|| DiceParseError::InvalidNotation(input.clone()))?;

        let count_str = &input[..d_pos];
        let count: u32 = if count_str.is_empty() {
            1
        } else {
            count_str
                .parse()
                .map_err(|_| DiceParseError::InvalidNotation(input.clone()))?
        };

        let after_d = &input[d_pos + 1..];

        let (sides_str, modifier) = if let Some(plus_pos) = after_d.find('+') {
            let mod_str = &after_d[plus_pos + 1..];
            let modifier: i32 = mod_str
                .parse()
                .map_err(|_| DiceParseError::InvalidNotation(input.clone()))?;
            (&after_d[..plus_pos], modifier)
        } else if let Some(minus_pos) = after_d.find('-') {
            let mod_str = &after_d[minus_pos + 1..];
            let modifier: i32 = mod_str
                .parse()
                .map_err(|_| DiceParseError::InvalidNotation(input.clone()))?;
            (&after_d[..minus_pos], -modifier)
        } else {
            (after_d, 0)
        };

        let sides: u32 = sides_str
            .parse()
            .map_err(|_| DiceParseError::InvalidNotation(input.clone()))?;

        Self::new(count, sides, modifier)
    }

    /// Minimum possible total.
    pub fn min_total(&self) -> i32 {
        self.count as i32 + self.modifier
    }

    /// Maximum possible total.
    pub fn max_total(&self) -> i32 {
        (self.count * self.sides) as i32 + self.modifier
    }
}

impl fmt::Display for DiceNotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifier == 0 {
            write!(f, "{}d{}", self.count, self.sides)
        } else if self.modifier > 0 {
            write!(f, "{}d{}+{}", self.count, self.sides, self.modifier)
        } else {
            write!(f, "{}d{}{}", self.count, self.sides, self.modifier)
        }
    }
}

/// Critical outcome of a single-d20 roll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Critical {
    Hit,
    Fail,
}

/// Result of a dice roll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRoll {
    /// The notation that was rolled (annotated for advantage/disadvantage)
    pub notation: String,
    /// Individual die results that count toward the total
    pub rolls: Vec<i32>,
    /// Modifier applied after the dice
    pub modifier: i32,
    /// Final total (sum of rolls + modifier)
    pub total: i32,
    /// Whether the roll beat its target, when one was given
    pub success: Option<bool>,
    /// Natural 20 / natural 1 on a single d20
    pub critical: Option<Critical>,
    /// The discarded set when rolled with advantage or disadvantage
    pub discarded_rolls: Option<Vec<i32>>,
}

fn roll_die(rng: &mut impl Rng, sides: u32) -> i32 {
    rng.gen_range(1..=sides as i32)
}

fn critical_for(notation: DiceNotation, rolls: &[i32]) -> Option<Critical> {
    if notation.sides == 20 && notation.count == 1 {
        match rolls.first().copied() {
            Some(20) => Some(Critical::Hit),
            Some(1) => Some(Critical::Fail),
            _ => None,
        }
    } else {
        None
    }
}

/// Roll dice using standard notation.
pub fn roll(rng: &mut impl Rng, notation: &str) -> Result<DiceRoll, DiceParseError> {
    let parsed = DiceNotation::parse(notation)?;
    let rolls: Vec<i32> = (0..parsed.count).map(|_| roll_die(rng, parsed.sides)).collect();
    let total: i32 = rolls.iter().sum::<i32>() + parsed.modifier;

    Ok(DiceRoll {
        notation: notation.to_string(),
        critical: critical_for(parsed, &rolls),
        rolls,
        modifier: parsed.modifier,
        total,
        success: None,
        discarded_rolls: None,
    })
}

fn roll_twice(
    rng: &mut impl Rng,
    notation: &str,
    keep_higher: bool,
) -> Result<DiceRoll, DiceParseError> {
    let parsed = DiceNotation::parse(notation)?;
    let first: Vec<i32> = (0..parsed.count).map(|_| roll_die(rng, parsed.sides)).collect();
    let second: Vec<i32> = (0..parsed.count).map(|_| roll_die(rng, parsed.sides)).collect();

    let sum_first: i32 = first.iter().sum();
    let sum_second: i32 = second.iter().sum();

    let first_wins = if keep_higher {
        sum_first >= sum_second
    } else {
        sum_first <= sum_second
    };
    let (kept, discarded) = if first_wins { (first, second) } else { (second, first) };

    let total: i32 = kept.iter().sum::<i32>() + parsed.modifier;
    let label = if keep_higher { "advantage" } else { "disadvantage" };

    Ok(DiceRoll {
        notation: format!("{notation} ({label})"),
        critical: critical_for(parsed, &kept),
        rolls: kept,
        modifier: parsed.modifier,
        total,
        success: None,
        discarded_rolls: Some(discarded),
    })
}

/// Roll with advantage: roll the full notation twice, keep the higher sum.
pub fn roll_with_advantage(rng: &mut impl Rng, notation: &str) -> Result<DiceRoll, DiceParseError> {
    roll_twice(rng, notation, true)
}

/// Roll with disadvantage: roll the full notation twice, keep the lower sum.
pub fn roll_with_disadvantage(
    rng: &mut impl Rng,
    notation: &str,
) -> Result<DiceRoll, DiceParseError> {
    roll_twice(rng, notation, false)
}

fn d20_notation(modifier: i32) -> String {
    if modifier == 0 {
        "1d20".to_string()
    } else if modifier > 0 {
        format!("1d20+{modifier}")
    } else {
        format!("1d20{modifier}")
    }
}

/// Make a skill check against a DC. Advantage and disadvantage supplied
/// together cancel to a plain roll.
pub fn skill_check(
    rng: &mut impl Rng,
    dc: i32,
    modifier: i32,
    advantage: bool,
    disadvantage: bool,
) -> Result<DiceRoll, DiceParseError> {
    let notation = d20_notation(modifier);
    let mut result = if advantage && !disadvantage {
        roll_with_advantage(rng, &notation)?
    } else if disadvantage && !advantage {
        roll_with_disadvantage(rng, &notation)?
    } else {
        roll(rng, &notation)?
    };
    result.success = Some(result.total >= dc);
    Ok(result)
}

/// Make a saving throw against a DC. Identical to a skill check.
pub fn saving_throw(
    rng: &mut impl Rng,
    dc: i32,
    modifier: i32,
    advantage: bool,
    disadvantage: bool,
) -> Result<DiceRoll, DiceParseError> {
    skill_check(rng, dc, modifier, advantage, disadvantage)
}

/// Make an attack roll against AC. A natural 20 always hits; a natural 1
/// always misses.
pub fn attack_roll(
    rng: &mut impl Rng,
    ac: i32,
    modifier: i32,
    advantage: bool,
    disadvantage: bool,
) -> Result<DiceRoll, DiceParseError> {
    let mut result = skill_check(rng, ac, modifier, advantage, disadvantage)?;
    match result.critical {
        Some(Critical::Hit) => result.success = Some(true),
        Some(Critical::Fail) => result.success = Some(false),
        None => {}
    }
    Ok(result)
}

/// Roll initiative: 1d20 + dexterity modifier.
pub fn roll_initiative(rng: &mut impl Rng, dex_modifier: i32) -> Result<DiceRoll, DiceParseError> {
    roll(rng, &d20_notation(dex_modifier))
}

/// Roll damage dice, doubling the dice count (modifier unchanged) on a
/// critical hit.
pub fn roll_damage(
    rng: &mut impl Rng,
    notation: &str,
    critical: bool,
) -> Result<DiceRoll, DiceParseError> {
    let parsed = DiceNotation::parse(notation)?;
    if !critical {
        return roll(rng, notation);
    }
    let doubled = DiceNotation {
        count: parsed.count * 2,
        sides: parsed.sides,
        modifier: parsed.modifier,
    };
    roll(rng, &doubled.to_string())
}

/// Roll a single ability score: 4d6, drop the lowest.
pub fn roll_stat(rng: &mut impl Rng) -> i32 {
    let mut rolls: Vec<i32> = (0..4).map(|_| roll_die(rng, 6)).collect();
    rolls.sort_unstable_by(|a, b| b.cmp(a));
    rolls.iter().take(3).sum()
}

/// Names of the six ability scores, in rolling order.
pub const STAT_NAMES: [&str; 6] = [
    "strength",
    "dexterity",
    "constitution",
    "intelligence",
    "wisdom",
    "charisma",
];

/// Roll a complete stat block: six independent 4d6-drop-lowest scores.
pub fn roll_stats(rng: &mut impl Rng) -> Vec<(&'static str, i32)> {
    STAT_NAMES.iter().map(|name| (*name, roll_stat(rng))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn parse_full_notation() {
        let parsed = DiceNotation::parse("2d6+3").expect("parse");
        assert_eq!(parsed, DiceNotation { count: 2, sides: 6, modifier: 3 });
    }

    #[test]
    fn parse_defaults_count_to_one() {
        let parsed = DiceNotation::parse("d20").expect("parse");
        assert_eq!(parsed.count, 1);
        assert_eq!(parsed.sides, 20);
        assert_eq!(parsed.modifier, 0);
    }

    #[test]
    fn parse_negative_modifier() {
        let parsed = DiceNotation::parse("4d8-2").expect("parse");
        assert_eq!(parsed.modifier, -2);
    }

    #[test]
    fn parse_rejects_unsupported_die() {
        assert_eq!(
            DiceNotation::parse("1d7"),
            Err(DiceParseError::InvalidDieSize(7))
        );
    }

    #[test]
    fn parse_accepts_count_limits() {
        assert!(DiceNotation::parse("1d6").is_ok());
        assert!(DiceNotation::parse("100d6").is_ok());
        assert_eq!(
            DiceNotation::parse("0d6"),
            Err(DiceParseError::InvalidDiceCount(0))
        );
        assert_eq!(
            DiceNotation::parse("101d6"),
            Err(DiceParseError::InvalidDiceCount(101))
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            DiceNotation::parse("banana"),
            Err(DiceParseError::InvalidNotation(_))
        ));
        assert_eq!(DiceNotation::parse("  "), Err(DiceParseError::Empty));
    }

    #[test]
    fn roll_total_is_sum_plus_modifier() {
        let mut rng = rng();
        for _ in 0..200 {
            let result = roll(&mut rng, "3d6+2").expect("roll");
            assert_eq!(result.total, result.rolls.iter().sum::<i32>() + 2);
            assert_eq!(result.rolls.len(), 3);
            for die in &result.rolls {
                assert!((1..=6).contains(die));
            }
        }
    }

    #[test]
    fn single_d20_reports_criticals() {
        let mut rng = rng();
        let mut seen_hit = false;
        let mut seen_fail = false;
        for _ in 0..500 {
            let result = roll(&mut rng, "1d20").expect("roll");
            match result.rolls[0] {
                20 => {
                    assert_eq!(result.critical, Some(Critical::Hit));
                    seen_hit = true;
                }
                1 => {
                    assert_eq!(result.critical, Some(Critical::Fail));
                    seen_fail = true;
                }
                _ => assert_eq!(result.critical, None),
            }
        }
        assert!(seen_hit && seen_fail);
    }

    #[test]
    fn multi_d20_never_reports_critical() {
        let mut rng = rng();
        for _ in 0..100 {
            let result = roll(&mut rng, "2d20").expect("roll");
            assert_eq!(result.critical, None);
        }
    }

    #[test]
    fn advantage_keeps_higher_sum() {
        let mut rng = rng();
        for _ in 0..200 {
            let result = roll_with_advantage(&mut rng, "1d20").expect("roll");
            let kept: i32 = result.rolls.iter().sum();
            let discarded: i32 = result.discarded_rolls.as_ref().expect("discarded").iter().sum();
            assert!(kept >= discarded);
            assert!(result.notation.contains("advantage"));
        }
    }

    #[test]
    fn disadvantage_keeps_lower_sum() {
        let mut rng = rng();
        for _ in 0..200 {
            let result = roll_with_disadvantage(&mut rng, "2d6").expect("roll");
            let kept: i32 = result.rolls.iter().sum();
            let discarded: i32 = result.discarded_rolls.as_ref().expect("discarded").iter().sum();
            assert!(kept <= discarded);
        }
    }

    #[test]
    fn skill_check_compares_against_dc() {
        let mut rng = rng();
        for _ in 0..200 {
            let result = skill_check(&mut rng, 10, 3, false, false).expect("check");
            assert_eq!(result.success, Some(result.total >= 10));
        }
    }

    #[test]
    fn advantage_and_disadvantage_cancel() {
        let mut rng = rng();
        let result = skill_check(&mut rng, 10, 0, true, true).expect("check");
        assert!(result.discarded_rolls.is_none());
        assert!(!result.notation.contains("advantage"));
    }

    #[test]
    fn natural_twenty_always_hits() {
        let mut rng = rng();
        loop {
            let result = attack_roll(&mut rng, 30, 0, false, false).expect("attack");
            if result.critical == Some(Critical::Hit) {
                assert_eq!(result.success, Some(true));
                break;
            }
        }
    }

    #[test]
    fn natural_one_always_misses() {
        let mut rng = rng();
        loop {
            let result = attack_roll(&mut rng, 1, 10, false, false).expect("attack");
            if result.critical == Some(Critical::Fail) {
                assert_eq!(result.success, Some(false));
                break;
            }
        }
    }

    #[test]
    fn critical_damage_doubles_dice_not_modifier() {
        let mut rng = rng();
        for _ in 0..100 {
            let result = roll_damage(&mut rng, "2d6+3", true).expect("damage");
            assert_eq!(result.rolls.len(), 4);
            assert_eq!(result.modifier, 3);
        }
    }

    #[test]
    fn stat_roll_is_within_bounds() {
        let mut rng = rng();
        for _ in 0..500 {
            let stat = roll_stat(&mut rng);
            assert!((3..=18).contains(&stat));
        }
    }

    #[test]
    fn stats_block_has_six_named_scores() {
        let mut rng = rng();
        let stats = roll_stats(&mut rng);
        assert_eq!(stats.len(), 6);
        assert_eq!(stats[0].0, "strength");
        assert_eq!(stats[5].0, "charisma");
    }

    #[test]
    fn four_d6_statistics() {
        // 10,000 samples of 4d6: every total in [4, 24], mean within 0.3 of 14.
        let mut rng = rng();
        let mut sum: i64 = 0;
        const SAMPLES: i64 = 10_000;
        for _ in 0..SAMPLES {
            let result = roll(&mut rng, "4d6").expect("roll");
            assert!((4..=24).contains(&result.total));
            sum += i64::from(result.total);
        }
        let mean = sum as f64 / SAMPLES as f64;
        assert!((mean - 14.0).abs() < 0.3, "mean was {mean}");
    }
}
