//! Turns raw round results into cumulative player scores.
//!
//! Points are applied with the store's atomic increment so concurrent writers
//! never lose each other's updates. Unlike the other write paths, a failed
//! increment is logged and skipped rather than returned.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    dao::{paths, state_store::StateStore, storage::StorageResult},
    state::room::{PlayerId, Room},
};

/// Rank-based points: results sorted ascending (lower is better), the best
/// result earns one point per submitted result and last place earns one.
///
/// Equal results keep submission order, so the earlier submission ranks first.
pub fn rank_points(results: &IndexMap<PlayerId, i64>) -> IndexMap<PlayerId, u32> {
    let mut ranked: Vec<(&PlayerId, i64)> = results.iter().map(|(id, v)| (id, *v)).collect();
    ranked.sort_by_key(|(_, value)| *value);

    let total = ranked.len();
    ranked
        .into_iter()
        .enumerate()
        .map(|(rank, (id, _))| (id.clone(), (total - rank) as u32))
        .collect()
}

/// Flat bonus: every player except `loser` earns `bonus`; the loser earns 0.
pub fn flat_bonus<'a>(
    players: impl IntoIterator<Item = &'a PlayerId>,
    loser: Option<&str>,
    bonus: u32,
) -> IndexMap<PlayerId, u32> {
    players
        .into_iter()
        .map(|id| {
            let points = if Some(id.as_str()) == loser { 0 } else { bonus };
            (id.clone(), points)
        })
        .collect()
}

/// Add `deltas` to the persisted scores of room `code`.
///
/// Each player is incremented independently; a failed increment is logged and
/// skipped so one unreachable path does not block the others. Returns the new
/// totals of the players that were updated.
pub async fn apply(
    store: &dyn StateStore,
    code: &str,
    deltas: &IndexMap<PlayerId, u32>,
) -> IndexMap<PlayerId, i64> {
    let mut totals = IndexMap::with_capacity(deltas.len());
    for (player_id, points) in deltas {
        if *points == 0 {
            continue;
        }
        let path = paths::player_score(code, player_id);
        match store.increment(&path, i64::from(*points)).await {
            Ok(total) => {
                debug!(room = %code, player = %player_id, points, total, "score applied");
                totals.insert(player_id.clone(), total);
            }
            Err(err) => {
                warn!(room = %code, player = %player_id, error = %err, "failed to apply score");
            }
        }
    }
    totals
}

/// Reset every player's score in `room` to zero with a single multi-path update.
pub async fn reset_scores(store: &dyn StateStore, room: &Room) -> StorageResult<()> {
    if room.players.is_empty() {
        return Ok(());
    }
    let fields: Map<String, Value> = room
        .players
        .keys()
        .map(|id| (format!("{id}/score"), Value::from(0)))
        .collect();
    store.update(&paths::players(&room.code), fields).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::state_store::MemoryStore,
        state::room::Player,
    };
    use serde_json::json;

    fn results(entries: &[(&str, i64)]) -> IndexMap<PlayerId, i64> {
        entries.iter().map(|(id, v)| (id.to_string(), *v)).collect()
    }

    #[test]
    fn rank_points_reward_lowest_result() {
        let points = rank_points(&results(&[("A", 5), ("B", 2), ("C", 8)]));
        assert_eq!(points["A"], 2);
        assert_eq!(points["B"], 3);
        assert_eq!(points["C"], 1);
    }

    #[test]
    fn rank_ties_keep_submission_order() {
        let points = rank_points(&results(&[("first", 4), ("second", 4), ("best", 1)]));
        assert_eq!(points["best"], 3);
        assert_eq!(points["first"], 2);
        assert_eq!(points["second"], 1);
        assert!(rank_points(&IndexMap::new()).is_empty());
    }

    #[test]
    fn flat_bonus_skips_the_loser() {
        let players: Vec<PlayerId> = ["A", "B", "C", "D"].map(String::from).to_vec();
        let points = flat_bonus(&players, Some("D"), 2);
        assert_eq!(
            points.into_iter().collect::<Vec<_>>(),
            vec![
                ("A".to_string(), 2),
                ("B".to_string(), 2),
                ("C".to_string(), 2),
                ("D".to_string(), 0)
            ]
        );
    }

    #[test]
    fn flat_bonus_without_loser_rewards_everyone() {
        let players: Vec<PlayerId> = vec!["solo".into()];
        assert_eq!(flat_bonus(&players, None, 2)["solo"], 2);
    }

    #[tokio::test]
    async fn apply_increments_existing_scores() {
        let store = MemoryStore::new();
        store
            .write("rooms/AB23/players/A/score", json!(3))
            .await
            .unwrap();

        let deltas: IndexMap<PlayerId, u32> =
            [("A".to_string(), 2), ("B".to_string(), 0), ("C".to_string(), 1)].into();
        let totals = apply(&store, "AB23", &deltas).await;

        assert_eq!(totals.get("A"), Some(&5));
        assert_eq!(totals.get("B"), None);
        assert_eq!(totals.get("C"), Some(&1));
        assert_eq!(store.read("rooms/AB23/players/B/score").await.unwrap(), None);
    }

    #[tokio::test]
    async fn apply_skips_players_whose_increment_fails() {
        let store = MemoryStore::new();
        store
            .write("rooms/AB23/players/A/score", json!("corrupt"))
            .await
            .unwrap();

        let deltas: IndexMap<PlayerId, u32> = [("A".to_string(), 2), ("B".to_string(), 2)].into();
        let totals = apply(&store, "AB23", &deltas).await;

        assert_eq!(totals.len(), 1);
        assert_eq!(totals.get("B"), Some(&2));
    }

    #[tokio::test]
    async fn reset_scores_zeroes_every_player() {
        let store = MemoryStore::new();
        let mut room = Room::new("AB23", "2026-01-01T00:00:00Z");
        for (id, score) in [("A", 4), ("B", 9)] {
            let mut player = Player::new(id, id, id == "A");
            player.score = score;
            room.players.insert(id.into(), player);
        }
        store
            .write("rooms/AB23", serde_json::to_value(&room).unwrap())
            .await
            .unwrap();

        reset_scores(&store, &room).await.unwrap();

        assert_eq!(store.read("rooms/AB23/players/A/score").await.unwrap(), Some(json!(0)));
        assert_eq!(store.read("rooms/AB23/players/B/score").await.unwrap(), Some(json!(0)));
        assert_eq!(
            store.read("rooms/AB23/players/B/name").await.unwrap(),
            Some(json!("B"))
        );
    }
}
