use crate::cost::Amount;

pub fn human_money(amount: Amount) -> String {
    if amount < 0.0 {
        format!("-${:.2}", -amount)
    } else {
        format!("${amount:.2}")
    }
}

pub fn human_duration(duration: std::time::Duration) -> String {
    // Truncate to whole seconds, sub-second precision is noise here
    humantime::format_duration(std::time::Duration::from_secs(duration.as_secs())).to_string()
}

#[cfg(test)]
mod tests {
    use super::{human_duration, human_money};
    use std::time::Duration;

    #[test]
    fn test_money() {
        assert_eq!(human_money(0.0).as_str(), "$0.00");
        assert_eq!(human_money(1.5).as_str(), "$1.50");
        assert_eq!(human_money(1234.567).as_str(), "$1234.57");
        assert_eq!(human_money(-3.2).as_str(), "-$3.20");
    }

    #[test]
    fn test_duration() {
        assert_eq!(human_duration(Duration::from_secs(90)).as_str(), "1m 30s");
        assert_eq!(
            human_duration(Duration::from_millis(61_250)).as_str(),
            "1m 1s"
        );
    }
}
