/// Typed wrappers over the upstream JSON-RPC methods enumerated in spec
/// §6, layered on top of `RpcClient::call_method`. Transaction parsing
/// mirrors the teacher's `core/enhanced_parser.rs` approach of reading
/// `meta.preBalances`/`postBalances`/`preTokenBalances`/`postTokenBalances`
/// out of the raw `jsonParsed` envelope.
use crate::core::errors::{EngineError, Result};
use crate::domain::schema::{BalanceDelta, Transaction};
use crate::rpc::client::RpcClient;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct TokenBalanceEntry {
    #[serde(rename = "accountIndex")]
    account_index: usize,
    #[serde(default)]
    owner: Option<String>,
    mint: String,
    #[serde(rename = "uiTokenAmount")]
    ui_token_amount: UiTokenAmount,
}

#[derive(Debug, Deserialize)]
struct UiTokenAmount {
    #[serde(default, rename = "uiAmount")]
    ui_amount: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TxMeta {
    #[serde(default)]
    err: Option<serde_json::Value>,
    #[serde(default, rename = "preBalances")]
    pre_balances: Vec<u64>,
    #[serde(default, rename = "postBalances")]
    post_balances: Vec<u64>,
    #[serde(default, rename = "preTokenBalances")]
    pre_token_balances: Vec<TokenBalanceEntry>,
    #[serde(default, rename = "postTokenBalances")]
    post_token_balances: Vec<TokenBalanceEntry>,
}

#[derive(Debug, Deserialize)]
struct TxMessage {
    #[serde(default, rename = "accountKeys")]
    account_keys: Vec<AccountKeyEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AccountKeyEntry {
    Plain(String),
    Parsed { pubkey: String },
}

impl AccountKeyEntry {
    fn pubkey(&self) -> String {
        match self {
            AccountKeyEntry::Plain(s) => s.clone(),
            AccountKeyEntry::Parsed { pubkey } => pubkey.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TxEnvelope {
    message: TxMessage,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    slot: u64,
    #[serde(default, rename = "blockTime")]
    block_time: Option<i64>,
    #[serde(default)]
    meta: Option<TxMeta>,
    transaction: TxEnvelope,
}

/// Fetch and parse a single transaction (spec §6's `getTransaction`).
pub async fn get_transaction(client: &RpcClient, signature: &str) -> Result<Transaction> {
    let opts = serde_json::json!({
        "encoding": "jsonParsed",
        "maxSupportedTransactionVersion": 0,
        "commitment": "confirmed",
    });

    let raw: RawTransaction = client
        .call_method("getTransaction", (signature, opts))
        .await?;

    let account_keys: Vec<String> = raw
        .transaction
        .message
        .account_keys
        .iter()
        .map(|k| k.pubkey())
        .collect();

    let meta = raw
        .meta
        .ok_or_else(|| EngineError::MalformedResponse("transaction missing meta".to_string()))?;

    let was_error = meta.err.is_some();

    let sol_deltas = meta
        .pre_balances
        .iter()
        .zip(meta.post_balances.iter())
        .enumerate()
        .map(|(idx, (pre, post))| BalanceDelta {
            account_index: idx,
            owner: account_keys.get(idx).cloned(),
            pre_amount: *pre as f64 / 1_000_000_000.0,
            post_amount: *post as f64 / 1_000_000_000.0,
            mint: None,
        })
        .collect();

    let token_deltas = merge_token_balances(&meta.pre_token_balances, &meta.post_token_balances);

    Ok(Transaction {
        signature: signature.to_string(),
        slot: raw.slot,
        block_time: raw.block_time,
        account_keys,
        sol_deltas,
        token_deltas,
        was_error,
    })
}

fn merge_token_balances(
    pre: &[TokenBalanceEntry],
    post: &[TokenBalanceEntry],
) -> Vec<BalanceDelta> {
    let mut deltas = Vec::new();
    for post_entry in post {
        let pre_amount = pre
            .iter()
            .find(|p| p.account_index == post_entry.account_index)
            .and_then(|p| p.ui_token_amount.ui_amount)
            .unwrap_or(0.0);
        deltas.push(BalanceDelta {
            account_index: post_entry.account_index,
            owner: post_entry.owner.clone(),
            pre_amount,
            post_amount: post_entry.ui_token_amount.ui_amount.unwrap_or(0.0),
            mint: Some(post_entry.mint.clone()),
        });
    }
    // Accounts that were fully drained only appear in `pre`.
    for pre_entry in pre {
        if !post.iter().any(|p| p.account_index == pre_entry.account_index) {
            deltas.push(BalanceDelta {
                account_index: pre_entry.account_index,
                owner: pre_entry.owner.clone(),
                pre_amount: pre_entry.ui_token_amount.ui_amount.unwrap_or(0.0),
                post_amount: 0.0,
                mint: Some(pre_entry.mint.clone()),
            });
        }
    }
    deltas
}

#[derive(Debug, Deserialize)]
struct AccountInfoValue {
    owner: String,
}

#[derive(Debug, Deserialize)]
struct AccountInfoResult {
    value: Option<AccountInfoValue>,
}

/// `getAccountInfo(address) -> {value: {owner, ...}}`.
pub async fn get_account_owner(client: &RpcClient, address: &str) -> Result<Option<String>> {
    let opts = serde_json::json!({"encoding": "jsonParsed"});
    let result: AccountInfoResult = client.call_method("getAccountInfo", (address, opts)).await?;
    Ok(result.value.map(|v| v.owner))
}

/// `getBalance(address) -> lamports`.
pub async fn get_balance_sol(client: &RpcClient, address: &str) -> Result<f64> {
    #[derive(Deserialize)]
    struct BalanceResult {
        value: u64,
    }
    let result: BalanceResult = client.call_method("getBalance", (address,)).await?;
    Ok(result.value as f64 / 1_000_000_000.0)
}

#[derive(Debug, Deserialize, Clone)]
pub struct LargestAccountEntry {
    pub address: String,
    #[serde(rename = "uiAmount")]
    pub ui_amount: Option<f64>,
}

/// `getTokenLargestAccounts(mint) -> {value: [{address, uiAmount}]}`.
pub async fn get_token_largest_accounts(
    client: &RpcClient,
    mint: &str,
) -> Result<Vec<LargestAccountEntry>> {
    #[derive(Deserialize)]
    struct Resp {
        value: Vec<LargestAccountEntry>,
    }
    let result: Resp = client.call_method("getTokenLargestAccounts", (mint,)).await?;
    Ok(result.value)
}

/// `getSlot() -> slot`.
pub async fn get_slot(client: &RpcClient) -> Result<u64> {
    client.call_method("getSlot", ()).await
}

const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

#[derive(Debug, Deserialize)]
struct ParsedTokenAccountEntry {
    account: ParsedTokenAccount,
}

#[derive(Debug, Deserialize)]
struct ParsedTokenAccount {
    data: ParsedTokenAccountData,
}

#[derive(Debug, Deserialize)]
struct ParsedTokenAccountData {
    parsed: ParsedTokenAccountInfo,
}

#[derive(Debug, Deserialize)]
struct ParsedTokenAccountInfo {
    info: ParsedTokenAccountDetail,
}

#[derive(Debug, Deserialize)]
struct ParsedTokenAccountDetail {
    mint: String,
    #[serde(rename = "tokenAmount")]
    token_amount: UiTokenAmount,
}

#[derive(Debug, Clone)]
pub struct OwnedTokenAccount {
    pub mint: String,
    pub ui_amount: f64,
}

/// `getParsedTokenAccountsByOwner(owner, {programId}) -> [{account: {data: {parsed: {info: {mint, tokenAmount}}}}}]`.
pub async fn get_token_accounts_by_owner(
    client: &RpcClient,
    owner: &str,
) -> Result<Vec<OwnedTokenAccount>> {
    #[derive(Deserialize)]
    struct Resp {
        value: Vec<ParsedTokenAccountEntry>,
    }
    let opts = serde_json::json!({"programId": TOKEN_PROGRAM_ID});
    let encoding = serde_json::json!({"encoding": "jsonParsed"});
    let result: Resp = client
        .call_method("getParsedTokenAccountsByOwner", (owner, opts, encoding))
        .await?;
    Ok(result
        .value
        .into_iter()
        .map(|e| OwnedTokenAccount {
            mint: e.account.data.parsed.info.mint,
            ui_amount: e.account.data.parsed.info.token_amount.ui_amount.unwrap_or(0.0),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_token_balances_by_account_index() {
        let pre = vec![TokenBalanceEntry {
            account_index: 3,
            owner: Some("OwnerA".to_string()),
            mint: "MintX".to_string(),
            ui_token_amount: UiTokenAmount { ui_amount: Some(10.0) },
        }];
        let post = vec![TokenBalanceEntry {
            account_index: 3,
            owner: Some("OwnerA".to_string()),
            mint: "MintX".to_string(),
            ui_token_amount: UiTokenAmount { ui_amount: Some(15.0) },
        }];
        let deltas = merge_token_balances(&pre, &post);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].delta(), 5.0);
    }

    #[test]
    fn drained_account_only_in_pre_yields_negative_delta() {
        let pre = vec![TokenBalanceEntry {
            account_index: 7,
            owner: Some("OwnerB".to_string()),
            mint: "MintX".to_string(),
            ui_token_amount: UiTokenAmount { ui_amount: Some(20.0) },
        }];
        let deltas = merge_token_balances(&pre, &[]);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].delta(), -20.0);
    }
}
