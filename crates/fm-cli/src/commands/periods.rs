//! Periods command: list the predefined period names.

use std::io::Write;

use anyhow::Result;
use fm_core::PREDEFINED_PERIODS;

pub fn run<W: Write>(writer: &mut W) -> Result<()> {
    for (name, pattern) in PREDEFINED_PERIODS {
        writeln!(writer, "{name:<6} {pattern}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    #[test]
    fn lists_predefined_periods() {
        let mut output = Vec::new();
        run(&mut output).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        5m     */5 * * * *
        hour   0 * * * *
        day    0 0 * * *
        week   0 0 * * 1
        month  0 0 1 * *
        year   0 0 1 1 *
        ");
    }
}
