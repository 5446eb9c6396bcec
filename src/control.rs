//! Chooser control-input surface (section 6): a single textual command,
//! `CHOSEN <indirect-id> <host-node>`, read one line at a time from
//! whatever the operator wires to this daemon's stdin (a chooser process,
//! a FIFO, a supervisor). Unparseable lines are logged and ignored.

pub struct ChosenCommand {
    pub id: u32,
    pub host_node: String,
}

/// Parses a single `CHOSEN <id> <host>` line. `id` is decimal or `0x`-prefixed
/// hex, matching how indirect ids are logged elsewhere.
pub fn parse_chosen(line: &str) -> Option<ChosenCommand> {
    let mut parts = line.trim().split_whitespace();

    if !parts.next()?.eq_ignore_ascii_case("CHOSEN") {
        return None;
    }

    let id_text = parts.next()?;
    let id = if let Some(hex) = id_text.strip_prefix("0x") {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        id_text.parse().ok()?
    };

    let host_node = parts.next()?.to_string();
    Some(ChosenCommand { id, host_node })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_id() {
        let cmd = parse_chosen("CHOSEN 42 terminal.example.com").unwrap();
        assert_eq!(cmd.id, 42);
        assert_eq!(cmd.host_node, "terminal.example.com");
    }

    #[test]
    fn parses_hex_id_case_insensitively() {
        let cmd = parse_chosen("chosen 0x2a 10.0.0.9").unwrap();
        assert_eq!(cmd.id, 42);
    }

    #[test]
    fn rejects_other_commands() {
        assert!(parse_chosen("PING").is_none());
        assert!(parse_chosen("CHOSEN 1").is_none());
    }
}
