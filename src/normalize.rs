//! Cross-chain token & pair-key normalization
//!
//! The Price Data Manager indexes prices by a *normalized* pair key so that
//! `"uniswap_v3_WETH_USDC"` on Ethereum and `"pancake_WETH.e_USDC"` on BSC
//! land in the same bucket. Matching is always exact-string on the
//! normalized token parts — substring matching would let `"ETH"` spuriously
//! match `"WETH_USDC"` before normalization folds `ETH` into `WETH`.

use crate::types::TOKEN_PAIR_INTERNAL_SEPARATOR;

/// Per-chain wrapped/bridged aliases that should be treated as the same
/// asset for cross-chain matching purposes.
const ALIASES: &[(&str, &str)] = &[
    ("WETH.e", "WETH"),
    ("ETH", "WETH"),
    ("WETH", "WETH"),
    ("fUSDT", "USDT"),
    ("USDT.e", "USDT"),
    ("axlUSDT", "USDT"),
    ("BTCB", "WBTC"),
    ("WBTC.e", "WBTC"),
    ("BTC.b", "WBTC"),
    ("renBTC", "WBTC"),
    ("USDC.e", "USDC"),
    ("axlUSDC", "USDC"),
    ("MATIC", "WMATIC"),
    ("BNB", "WBNB"),
    ("AVAX", "WAVAX"),
];

/// Maps a chain-specific token symbol to its cross-chain canonical form.
/// Unknown symbols pass through unchanged.
pub fn normalize_token_for_cross_chain(token: &str) -> String {
    for (alias, canonical) in ALIASES {
        if *alias == token {
            return (*canonical).to_string();
        }
    }
    token.to_string()
}

/// Splits a pair key into its last two `_`-separated components, e.g.
/// `"uniswap_v3_WETH_USDC"` -> `("WETH", "USDC")`. Returns `None` if the key
/// has fewer than two components.
pub fn split_pair_parts(pair_key: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = pair_key.split(TOKEN_PAIR_INTERNAL_SEPARATOR).collect();
    if parts.len() < 2 {
        return None;
    }
    let last = parts[parts.len() - 1].to_string();
    let second_last = parts[parts.len() - 2].to_string();
    Some((second_last, last))
}

/// Builds the normalized, order-independent bucket key used by
/// `PriceDataManager::by_token`. Sorting the two normalized token parts
/// alphabetically makes this a fixed point under re-normalization and
/// independent of which side of the pair each DEX lists first.
pub fn normalized_pair_key(pair_key: &str) -> Option<String> {
    let (a, b) = split_pair_parts(pair_key)?;
    let a = normalize_token_for_cross_chain(&a);
    let b = normalize_token_for_cross_chain(&b);
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    Some(format!("{lo}{TOKEN_PAIR_INTERNAL_SEPARATOR}{hi}"))
}

/// Returns true if `pair_key`'s two token parts, after normalization,
/// include `normalized_symbol` as an exact match (never substring).
pub fn pair_contains_token(pair_key: &str, normalized_symbol: &str) -> bool {
    match split_pair_parts(pair_key) {
        Some((a, b)) => {
            normalize_token_for_cross_chain(&a) == normalized_symbol
                || normalize_token_for_cross_chain(&b) == normalized_symbol
        }
        None => false,
    }
}
