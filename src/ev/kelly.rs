#[derive(Debug, Clone, Copy)]
pub struct KellyQuote {
    pub win_prob: f64,
    pub odds: f64,
    pub f_raw: f64,
    pub f_capped: f64,
}

/// Kelly criterion fraction for a binary payoff: f* = (p·b − q) / b with
/// b = payout / cost. Zero when the payoff is degenerate.
pub fn compute_kelly(
    win_prob: f64,
    payout_if_win: f64,
    cost_if_lose: f64,
    cap: f64,
) -> KellyQuote {
    if cost_if_lose <= 0.0 || payout_if_win <= 0.0 {
        return KellyQuote {
            win_prob,
            odds: 0.0,
            f_raw: 0.0,
            f_capped: 0.0,
        };
    }

    let p = win_prob;
    let q = 1.0 - p;
    let odds = payout_if_win / cost_if_lose;
    let f_raw = (p * odds - q) / odds;
    let f_capped = f_raw.max(0.0).min(cap.max(0.0));

    KellyQuote {
        win_prob,
        odds,
        f_raw,
        f_capped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kelly_zero_when_negative_edge() {
        let q = compute_kelly(0.45, 0.50, 0.50, 0.25);
        assert_eq!(q.f_capped, 0.0);
    }

    #[test]
    fn kelly_zero_on_degenerate_payoff() {
        assert_eq!(compute_kelly(0.9, 0.0, 0.5, 0.25).f_capped, 0.0);
        assert_eq!(compute_kelly(0.9, 0.5, 0.0, 0.25).f_capped, 0.0);
        assert_eq!(compute_kelly(0.9, -0.1, 0.5, 0.25).f_capped, 0.0);
    }

    #[test]
    fn kelly_capped_at_max_fraction() {
        // p=0.70 at a 0.55 entry: raw Kelly exceeds the 25% cap
        let q = compute_kelly(0.70, 0.45, 0.55, 0.25);
        assert!(q.f_raw > 0.25);
        assert_eq!(q.f_capped, 0.25);
    }

    #[test]
    fn kelly_bounded() {
        for p10 in 0..=10 {
            let p = p10 as f64 / 10.0;
            let q = compute_kelly(p, 0.45, 0.55, 0.25);
            assert!((0.0..=0.25).contains(&q.f_capped));
        }
    }
}
