use async_trait::async_trait;

use crate::dota2::{full, lobby_name, partial, Side};

/// Receives every match the watcher has not seen before.
#[async_trait]
pub trait MatchSink: Send + Sync {
    async fn deliver(
        &self,
        summary: &partial::MatchHistory,
        detail: &full::Match,
    ) -> anyhow::Result<()>;
}

pub struct LogSink {
    account_id: u64,
}

impl LogSink {
    pub fn new(account_id: u64) -> Self {
        Self { account_id }
    }

    pub fn describe(&self, detail: &full::Match) -> String {
        let mut line = format!(
            "match {} ({}, started at {}, {}m{:02}s): radiant {} - {} dire",
            detail.match_id,
            lobby_name(detail.lobby_type),
            detail.start_time,
            detail.duration / 60,
            detail.duration % 60,
            detail.radiant_score,
            detail.dire_score,
        );
        match detail.player(self.account_id) {
            Some(player) => {
                let side = Side::from(player.player_slot);
                let verdict = if side.won(detail.radiant_win) {
                    "won"
                } else {
                    "lost"
                };
                line.push_str(&format!(
                    ", {} {} on {} with hero {} ({}/{}/{})",
                    self.account_id,
                    verdict,
                    side,
                    player.hero_id,
                    player.kills,
                    player.deaths,
                    player.assists
                ));
            }
            None => {
                // private match data hides the account id behind 4294967295
                line.push_str(&format!(", {} not listed", self.account_id));
            }
        }
        line
    }
}

#[async_trait]
impl MatchSink for LogSink {
    async fn deliver(
        &self,
        summary: &partial::MatchHistory,
        detail: &full::Match,
    ) -> anyhow::Result<()> {
        log::debug!(
            "history: {} of {} results, {} remaining",
            summary.num_results,
            summary.total_results,
            summary.results_remaining
        );
        log::info!("{}", self.describe(detail));
        Ok(())
    }
}
