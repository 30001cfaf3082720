// ── Bus commands ──
//
// Everything published under the command prefix is a command for one hub:
// `<prefix><mac>/<segments...>` with the new value as payload, or one of
// the two control words `get_config` / `refresh_config`.

/// Payload that asks for every settings topic to be republished.
pub const GET_CONFIG: &str = "get_config";
/// Payload that discards a hub's settings until it pushes them again.
pub const REFRESH_CONFIG: &str = "refresh_config";

/// A command received on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusCommand {
    /// Republish the settings of every known hub.
    GetConfig,
    /// Clear the settings of `mac`.
    RefreshConfig { mac: String },
    /// Set one settings leaf. `path[0]` is the mac.
    Set { path: Vec<String>, value: String },
}

impl BusCommand {
    /// Parse a message received on `topic`. Returns `None` for topics
    /// outside `prefix`, and for anything but `get_config` without a mac
    /// segment.
    pub fn parse(prefix: &str, topic: &str, payload: &str) -> Option<Self> {
        let rest = topic.strip_prefix(prefix)?;
        let path: Vec<String> = rest
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_owned)
            .collect();
        if payload == GET_CONFIG {
            return Some(Self::GetConfig);
        }
        let mac = path.first()?.clone();

        Some(match payload {
            REFRESH_CONFIG => Self::RefreshConfig { mac },
            value => Self::Set {
                path,
                value: value.to_owned(),
            },
        })
    }

    /// The hub this command names, if any.
    pub fn mac(&self) -> Option<&str> {
        match self {
            Self::GetConfig => None,
            Self::RefreshConfig { mac } => Some(mac),
            Self::Set { path, .. } => path.first().map(String::as_str),
        }
    }
}

/// What a successfully executed command did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// A leaf was patched; the hub now has settings pending.
    Applied { mac: String },
    /// Settings were republished on this many topics.
    Republished { topics: usize },
    /// The hub's settings were cleared.
    Reset { mac: String },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PREFIX: &str = "/vegehub_config/";

    #[test]
    fn parses_leaf_update() {
        let cmd = BusCommand::parse(PREFIX, "/vegehub_config/AA01/hub/sample_period", "120");
        assert_eq!(
            cmd,
            Some(BusCommand::Set {
                path: vec!["AA01".into(), "hub".into(), "sample_period".into()],
                value: "120".into(),
            })
        );
        assert_eq!(cmd.unwrap().mac(), Some("AA01"));
    }

    #[test]
    fn parses_control_words() {
        assert_eq!(
            BusCommand::parse(PREFIX, "/vegehub_config/AA01", GET_CONFIG),
            Some(BusCommand::GetConfig)
        );
        assert_eq!(
            BusCommand::parse(PREFIX, "/vegehub_config/AA01/", REFRESH_CONFIG),
            Some(BusCommand::RefreshConfig { mac: "AA01".into() })
        );
    }

    #[test]
    fn empty_segments_are_ignored() {
        let cmd = BusCommand::parse(PREFIX, "/vegehub_config/AA01//sensors/1/name/", "x");
        assert_eq!(
            cmd,
            Some(BusCommand::Set {
                path: vec!["AA01".into(), "sensors".into(), "1".into(), "name".into()],
                value: "x".into(),
            })
        );
    }

    #[test]
    fn foreign_topics_and_missing_mac_are_rejected() {
        assert_eq!(BusCommand::parse(PREFIX, "/vegehub_status/AA01/hub", "1"), None);
        assert_eq!(BusCommand::parse(PREFIX, "/vegehub_config/", "1"), None);
        assert_eq!(
            BusCommand::parse(PREFIX, "/vegehub_config/", GET_CONFIG),
            Some(BusCommand::GetConfig)
        );
    }
}
