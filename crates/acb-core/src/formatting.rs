//! Number and file-name formatting shared by replies and exports.

/// Render a rate or amount the way bill texts echo user input:
/// integral values keep one decimal (`7.0`), others use the shortest
/// round-trip form (`7.25`).
pub fn plain_number(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

/// Two decimals, used for every money figure.
pub fn money(v: f64) -> String {
    format!("{:.2}", normalize_zero(v))
}

/// One decimal, used by the cross-chat statistics blocks.
pub fn money_short(v: f64) -> String {
    format!("{:.1}", normalize_zero(v))
}

/// No decimals, used by the compact deposit lines of the main bill.
pub fn whole(v: f64) -> String {
    format!("{:.0}", normalize_zero(v))
}

// Avoids "-0.00" after sums that cancel out.
fn normalize_zero(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

/// Replace every non-alphanumeric char so a chat title can be used in a file name.
pub fn safe_file_name(title: &str) -> String {
    let out: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    if out.is_empty() {
        "chat".to_string()
    } else {
        out
    }
}

/// `@a, @b` or `无` when empty.
pub fn mention_list<'a>(names: impl IntoIterator<Item = &'a String>) -> String {
    let joined = names
        .into_iter()
        .map(|n| format!("@{n}"))
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        "无".to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_number_keeps_one_decimal_for_integers() {
        assert_eq!(plain_number(7.0), "7.0");
        assert_eq!(plain_number(7.2), "7.2");
        assert_eq!(plain_number(0.0), "0.0");
        assert_eq!(plain_number(-3.0), "-3.0");
        assert_eq!(plain_number(0.125), "0.125");
    }

    #[test]
    fn money_never_prints_negative_zero() {
        assert_eq!(money(-0.0), "0.00");
        assert_eq!(money(13.888), "13.89");
        assert_eq!(money_short(100.0), "100.0");
        assert_eq!(whole(100.0), "100");
        assert_eq!(whole(-50.0), "-50");
    }

    #[test]
    fn file_names_keep_cjk_and_replace_punctuation() {
        assert_eq!(safe_file_name("佳琪 群/1"), "佳琪_群_1");
        assert_eq!(safe_file_name(""), "chat");
    }

    #[test]
    fn mention_list_formats_or_says_none() {
        let names = vec!["a".to_string(), "b".to_string()];
        assert_eq!(mention_list(&names), "@a, @b");
        assert_eq!(mention_list(&Vec::<String>::new()), "无");
    }
}
