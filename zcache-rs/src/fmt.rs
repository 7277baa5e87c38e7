//! Provides helpers to parse and format byte sizes.
//!
//! Memory limits of groups are specified in the system config using size expressions like
//! **64m**. The same unit system is used when reporting cache statistics.

/// Formats a given size in bytes.
///
/// This function determines the ideal unit (ranging from bytes to tebibytes) to provide
/// a concise representation.
///
/// # Examples
///
/// ```
/// assert_eq!(zcache::fmt::format_size(0), "0 bytes");
/// assert_eq!(zcache::fmt::format_size(1), "1 byte");
/// assert_eq!(zcache::fmt::format_size(100), "100 bytes");
/// assert_eq!(zcache::fmt::format_size(2048), "2.00 KiB");
/// assert_eq!(zcache::fmt::format_size(87_340), "85.3 KiB");
/// assert_eq!(zcache::fmt::format_size(873_400), "853 KiB");
/// assert_eq!(zcache::fmt::format_size(8_734_000), "8.33 MiB");
/// assert_eq!(zcache::fmt::format_size(8_734_000_000), "8.13 GiB");
/// ```
pub fn format_size(size_in_bytes: usize) -> String {
    match size_in_bytes {
        1 => return "1 byte".to_owned(),
        n if n < 1024 => return format!("{} bytes", n),
        _ => (),
    }

    let mut magnitude = 0;
    let mut size = size_in_bytes as f64;
    while size >= 1024. && magnitude < 4 {
        size /= 1024.;
        magnitude += 1;
    }

    let unit = match magnitude {
        1 => "KiB",
        2 => "MiB",
        3 => "GiB",
        _ => "TiB",
    };

    if size < 10. {
        format!("{:.2} {}", size, unit)
    } else if size < 100. {
        format!("{:.1} {}", size, unit)
    } else {
        format!("{:.0} {}", size, unit)
    }
}

/// Parses a size from a given string.
///
/// This string can have the following suffixes:
/// * **b** or **B**: treats the value as plain bytes
/// * **k** or **K**: multiplies the given value by 1024 thus treats the value as KiB
/// * **m** or **M**: multiplies the given value by 1.048.576 thus treats the value as MiB
/// * **g** or **G**: multiplies the given value by 1.073.741.824 thus treats the value as GiB
/// * **t** or **T**: multiplies the given value by 1.099.511.627.776 thus treats the value as TiB
///
/// Returns an **Err** if either a non-integer value is given, if an unknown suffix was provided
/// or if the result doesn't fit into a **usize**.
///
/// # Examples
///
/// ```
/// assert_eq!(zcache::fmt::parse_size("100").unwrap(), 100);
/// assert_eq!(zcache::fmt::parse_size("100b").unwrap(), 100);
/// assert_eq!(zcache::fmt::parse_size("2k").unwrap(), 2048);
/// assert_eq!(zcache::fmt::parse_size("8m").unwrap(), 8 * 1024 * 1024);
/// assert_eq!(zcache::fmt::parse_size(" 4 G ").unwrap(), 4 * 1024 * 1024 * 1024);
///
/// // An invalid suffix results in an error...
/// assert_eq!(zcache::fmt::parse_size("3 Y").is_err(), true);
///
/// // Decimal numbers result in an error...
/// assert_eq!(zcache::fmt::parse_size("1.2g").is_err(), true);
///
/// // Negative numbers result in an error...
/// assert_eq!(zcache::fmt::parse_size("-1").is_err(), true);
/// ```
pub fn parse_size(str: impl AsRef<str>) -> anyhow::Result<usize> {
    lazy_static::lazy_static! {
        static ref NUMBER_AND_SUFFIX: regex::Regex =
            regex::Regex::new(r"^ *(\d+) *([bBkKmMgGtT]?) *$").unwrap();
    }

    let captures = NUMBER_AND_SUFFIX.captures(str.as_ref()).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot parse '{}' into a size expression. \
             Expected a positive number and optionally 'b', 'k', 'm', 'g' or 't' as suffix.",
            str.as_ref()
        )
    })?;

    let number = captures[1].parse::<usize>()?;
    let factor: usize = match &captures[2] {
        "k" | "K" => 1 << 10,
        "m" | "M" => 1 << 20,
        "g" | "G" => 1 << 30,
        "t" | "T" => 1 << 40,
        _ => 1,
    };

    number
        .checked_mul(factor)
        .ok_or_else(|| anyhow::anyhow!("The size '{}' is too large.", str.as_ref()))
}

#[cfg(test)]
mod tests {
    use crate::fmt::{format_size, parse_size};

    #[test]
    fn parsed_sizes_can_be_formatted() {
        assert_eq!(format_size(parse_size("2k").unwrap()), "2.00 KiB");
        assert_eq!(format_size(parse_size("512m").unwrap()), "512 MiB");
        assert_eq!(format_size(parse_size("1023").unwrap()), "1023 bytes");
    }

    #[test]
    fn overflows_are_detected() {
        assert_eq!(parse_size("99999999999999999999").is_err(), true);
        assert_eq!(parse_size(format!("{}t", usize::MAX)).is_err(), true);
    }
}
