//! Static symbol-to-sector table for the default watchlist. Exposure is
//! grouped by these labels; unknown symbols fall into "Unknown".

pub fn sector_for(symbol: &str) -> &'static str {
    match symbol {
        "AAPL" | "MSFT" | "GOOGL" | "META" | "NVDA" => "Technology",
        "AMZN" | "TSLA" => "Consumer Discretionary",
        "JPM" | "V" => "Financials",
        "UNH" => "Healthcare",
        "XOM" | "CVX" => "Energy",
        "SPY" | "QQQ" | "IWM" | "DIA" => "Index",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown_symbols() {
        assert_eq!(sector_for("AAPL"), "Technology");
        assert_eq!(sector_for("SPY"), "Index");
        assert_eq!(sector_for("ZZZT"), "Unknown");
    }
}
