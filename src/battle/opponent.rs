//! 按回合生成电脑对手的酒馆阵容。

use rand::seq::SliceRandom;
use rand::Rng;

use super::combat::CombatUnit;
use crate::game::catalog;

pub const MAX_ROSTER_SIZE: usize = 7;
const HIGHEST_TIER: u8 = 3;

/// 第 1 回合一个随从，每两回合加一个，最多七个。
pub fn roster_size(round: u32) -> usize {
    (round / 2 + 1).min(MAX_ROSTER_SIZE as u32) as usize
}

/// 回合数的一半向上取整，并限制在酒馆的等级范围内。
pub fn max_tier(round: u32) -> u8 {
    round.div_ceil(2).clamp(1, u32::from(HIGHEST_TIER)) as u8
}

pub fn generate_opponent_roster<R: Rng + ?Sized>(round: u32, rng: &mut R) -> Vec<CombatUnit> {
    let tier_cap = max_tier(round);
    (0..roster_size(round))
        .filter_map(|_| {
            let tier = rng.gen_range(1..=tier_cap);
            catalog()
                .tavern_tier(tier)
                .choose(rng)
                .map(|minion| CombatUnit::from_tavern(minion))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn roster_grows_every_second_round_up_to_seven() {
        let sizes: Vec<usize> = (1..=14).map(roster_size).collect();
        assert_eq!(sizes, vec![1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 7]);
        assert_eq!(roster_size(0), 1);
    }

    #[test]
    fn tier_cap_follows_the_round() {
        let caps: Vec<u8> = [0, 1, 2, 3, 4, 5, 6, 40].iter().map(|&r| max_tier(r)).collect();
        assert_eq!(caps, vec![1, 1, 1, 2, 2, 3, 3, 3]);
    }

    #[test]
    fn generated_units_come_from_allowed_tiers() {
        let mut rng = SmallRng::seed_from_u64(5);
        for round in 1..=12 {
            let roster = generate_opponent_roster(round, &mut rng);
            assert_eq!(roster.len(), roster_size(round));
            for unit in &roster {
                assert!(unit.tier >= 1 && unit.tier <= max_tier(round));
                let minion = catalog()
                    .tavern_minion(&unit.card_id)
                    .expect("generated unit should exist in the tavern pool");
                assert_eq!(minion.tier, unit.tier);
                assert!(unit.is_alive());
            }
        }
    }
}
