/// On-Chain Tracer (ZachXBT-style, spec §4.9) — recursive backward-hop
/// walk over incoming SOL transfers, terminating on a known CEX / mixer /
/// bridge / swap address, with cycle detection and depth bounds.
///
/// Cluster computation over the set of visited wallets uses `petgraph`
/// (Design Notes §9 "Cyclic references" calls cluster graphs ephemeral and
/// discardable — an undirected graph's connected-component union is the
/// natural fit, generalising the teacher's manual adjacency-set walk).
use crate::core::errors::Result;
use crate::domain::exchange::{EntityDirectory, ExchangeWhitelist};
use crate::domain::schema::{EntityType, FundingHop};
use crate::rpc::{methods, RpcClient, SignatureFetcher};
use petgraph::graph::UnGraph;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

const MAX_HOPS: u32 = 5;
const RECENT_TX_SAMPLE: usize = 30;
const MIN_HOP_SOL: f64 = 0.5;
const FEE_SLACK: f64 = 0.10;
const MIN_HOLDERS_SAFE: usize = 100;

pub struct OnChainTracer {
    rpc: std::sync::Arc<RpcClient>,
    signatures: SignatureFetcher,
    entities: std::sync::Arc<EntityDirectory>,
    exchanges: std::sync::Arc<ExchangeWhitelist>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WashTradingAnalysis {
    pub suspicious_volume_sol: f64,
    pub circular_counterparties: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PotentialNextRug {
    pub mint: String,
    pub holder_account_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceReport {
    pub target: String,
    pub funding_chain: Vec<FundingHop>,
    pub cluster: Vec<String>,
    pub potential_next_rugs: Vec<PotentialNextRug>,
    pub wash_trading: WashTradingAnalysis,
    pub investigation_summary: String,
}

impl OnChainTracer {
    pub fn new(
        rpc: std::sync::Arc<RpcClient>,
        entities: std::sync::Arc<EntityDirectory>,
        exchanges: std::sync::Arc<ExchangeWhitelist>,
    ) -> Self {
        let signatures = SignatureFetcher::new(rpc.clone());
        Self { rpc, signatures, entities, exchanges }
    }

    pub async fn trace(&self, target: &str) -> Result<TraceReport> {
        let mut chain = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(target.to_string());

        let mut current = target.to_string();
        for level in 0..MAX_HOPS {
            let hop = match self.next_hop(level, &current).await? {
                Some(hop) => hop,
                None => break,
            };

            let terminal = hop.entity_type != EntityType::Wallet && hop.entity_type != EntityType::Unknown;
            let from = hop.from.clone();
            chain.push(hop);

            if terminal {
                break;
            }

            if visited.contains(&from) {
                tracing::info!(wallet = %from, "funding trace hit a visited wallet, stopping");
                break;
            }
            visited.insert(from.clone());
            current = from;
        }

        let cluster: Vec<String> = visited.into_iter().collect();

        let mut potential_next_rugs = Vec::new();
        for member in &cluster {
            if let Ok(accounts) = methods::get_token_accounts_by_owner(&self.rpc, member).await {
                for account in accounts {
                    if let Ok(largest) = methods::get_token_largest_accounts(&self.rpc, &account.mint).await {
                        if largest.len() < MIN_HOLDERS_SAFE {
                            potential_next_rugs.push(PotentialNextRug {
                                mint: account.mint,
                                holder_account_count: largest.len(),
                            });
                        }
                    }
                }
            }
        }

        let wash_trading = self.wash_trading_analysis(target).await?;

        let mut summary_parts = Vec::new();
        if let Some(terminal) = chain.iter().find(|h| h.entity_type == EntityType::Cex) {
            summary_parts.push(format!(
                "CEX DEPOSIT FOUND: chain terminates at {}",
                terminal.entity_label.clone().unwrap_or_else(|| terminal.to.clone())
            ));
        } else if let Some(terminal) = chain.last() {
            summary_parts.push(format!("chain of {} hop(s) collected, no labelled terminal reached", chain.len()));
            let _ = terminal;
        } else {
            summary_parts.push("no qualifying incoming transfers found".to_string());
        }
        if wash_trading.suspicious_volume_sol > 0.0 {
            summary_parts.push(format!(
                "wash-trading signal: {:.2} SOL circulated through {} circular counterpart(ies)",
                wash_trading.suspicious_volume_sol,
                wash_trading.circular_counterparties.len()
            ));
        }

        Ok(TraceReport {
            target: target.to_string(),
            funding_chain: chain,
            cluster,
            potential_next_rugs,
            wash_trading,
            investigation_summary: summary_parts.join("; "),
        })
    }

    async fn next_hop(&self, level: u32, wallet: &str) -> Result<Option<FundingHop>> {
        let signatures = self
            .signatures
            .fetch_signatures(wallet, crate::rpc::Bound::Limit(RECENT_TX_SAMPLE as u64))
            .await?;

        let mut best: Option<(f64, FundingHop)> = None;

        for sig in &signatures {
            let tx = match methods::get_transaction(&self.rpc, &sig.signature).await {
                Ok(tx) => tx,
                Err(_) => continue,
            };

            let Some(my_idx) = tx.account_keys.iter().position(|a| a == wallet) else { continue };
            let Some(my_delta) = tx.sol_deltas.iter().find(|d| d.account_index == my_idx) else { continue };
            if my_delta.delta() <= MIN_HOP_SOL {
                continue;
            }

            let sender = tx.sol_deltas.iter().find(|d| {
                d.account_index != my_idx && (-d.delta() - my_delta.delta()).abs() <= my_delta.delta() * FEE_SLACK
            });

            let Some(sender) = sender else { continue };
            let Some(sender_addr) = &sender.owner else { continue };

            if best.as_ref().map(|(amt, _)| my_delta.delta() > *amt).unwrap_or(true) {
                let entity_match = self.entities.classify(sender_addr);
                let (entity_type, entity_label) = match entity_match {
                    Some(m) => {
                        // Opportunistically promote newly-labelled CEX
                        // entities into the whitelist (spec §4.10).
                        if m.entity_type == EntityType::Cex {
                            self.exchanges.try_auto_detect(sender_addr, &m.label, "entity_directory");
                        }
                        (m.entity_type, Some(m.label))
                    }
                    None if self.exchanges.contains(sender_addr) => (EntityType::Cex, None),
                    None => (EntityType::Wallet, None),
                };

                best = Some((
                    my_delta.delta(),
                    FundingHop {
                        level,
                        from: sender_addr.clone(),
                        to: wallet.to_string(),
                        amount_sol: my_delta.delta(),
                        signature: sig.signature.clone(),
                        timestamp: sig.block_time,
                        entity_type,
                        entity_label,
                    },
                ));
            }
        }

        Ok(best.map(|(_, hop)| hop))
    }

    async fn wash_trading_analysis(&self, wallet: &str) -> Result<WashTradingAnalysis> {
        let signatures = self
            .signatures
            .fetch_signatures(wallet, crate::rpc::Bound::Limit(RECENT_TX_SAMPLE as u64))
            .await?;

        let mut inbound: HashMap<String, f64> = HashMap::new();
        let mut outbound: HashMap<String, f64> = HashMap::new();

        for sig in &signatures {
            let tx = match methods::get_transaction(&self.rpc, &sig.signature).await {
                Ok(tx) => tx,
                Err(_) => continue,
            };
            let Some(my_idx) = tx.account_keys.iter().position(|a| a == wallet) else { continue };
            let Some(my_delta) = tx.sol_deltas.iter().find(|d| d.account_index == my_idx) else { continue };

            for other in tx.sol_deltas.iter().filter(|d| d.account_index != my_idx) {
                let Some(other_addr) = &other.owner else { continue };
                if my_delta.delta() > 0.0 && other.delta() < 0.0 {
                    *inbound.entry(other_addr.clone()).or_insert(0.0) += my_delta.delta();
                } else if my_delta.delta() < 0.0 && other.delta() > 0.0 {
                    *outbound.entry(other_addr.clone()).or_insert(0.0) += -my_delta.delta();
                }
            }
        }

        let mut suspicious_volume = 0.0;
        let mut circular = Vec::new();
        for (counterparty, in_amount) in &inbound {
            if let Some(out_amount) = outbound.get(counterparty) {
                suspicious_volume += in_amount.min(*out_amount);
                circular.push(counterparty.clone());
            }
        }

        Ok(WashTradingAnalysis {
            suspicious_volume_sol: suspicious_volume,
            circular_counterparties: circular,
        })
    }
}

/// Union of visited wallets as an undirected graph, one connected
/// component per cluster. The walk here is always a single chain, so this
/// mainly exists to let multiple traces be merged into a shared cluster
/// view by the caller.
pub fn merge_clusters(chains: &[Vec<FundingHop>]) -> Vec<Vec<String>> {
    let mut graph = UnGraph::<String, ()>::new_undirected();
    let mut index: HashMap<String, petgraph::graph::NodeIndex> = HashMap::new();

    let mut node_for = |graph: &mut UnGraph<String, ()>, addr: &str| -> petgraph::graph::NodeIndex {
        *index
            .entry(addr.to_string())
            .or_insert_with(|| graph.add_node(addr.to_string()))
    };

    for chain in chains {
        for hop in chain {
            let a = node_for(&mut graph, &hop.from);
            let b = node_for(&mut graph, &hop.to);
            graph.add_edge(a, b, ());
        }
    }

    let mut components: Vec<Vec<String>> = Vec::new();
    let mut seen = HashSet::new();
    for start in graph.node_indices() {
        if seen.contains(&start) {
            continue;
        }
        let mut stack = vec![start];
        let mut component = Vec::new();
        while let Some(n) = stack.pop() {
            if !seen.insert(n) {
                continue;
            }
            component.push(graph[n].clone());
            for neighbor in graph.neighbors(n) {
                if !seen.contains(&neighbor) {
                    stack.push(neighbor);
                }
            }
        }
        components.push(component);
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_clusters_groups_connected_wallets() {
        let chains = vec![vec![
            FundingHop {
                level: 0,
                from: "A".to_string(),
                to: "B".to_string(),
                amount_sol: 1.0,
                signature: "sig1".to_string(),
                timestamp: None,
                entity_type: EntityType::Wallet,
                entity_label: None,
            },
            FundingHop {
                level: 1,
                from: "C".to_string(),
                to: "A".to_string(),
                amount_sol: 1.0,
                signature: "sig2".to_string(),
                timestamp: None,
                entity_type: EntityType::Wallet,
                entity_label: None,
            },
        ]];
        let components = merge_clusters(&chains);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].len(), 3);
    }
}
