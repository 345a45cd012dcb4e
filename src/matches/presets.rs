use super::format::FormatConfig;

/// A named league format.
#[derive(Debug, Clone, Copy)]
pub struct FormatPreset {
    pub name: &'static str,
    pub url: &'static str,
    pub format: FormatConfig,
    pub min_sets: usize,
}

const fn team_league(best_of: u32, all_kill: bool) -> FormatConfig {
    FormatConfig {
        best_of,
        all_kill,
        solo: false,
        ace_extension: 0,
        veto_count: 0,
    }
}

pub const PRESETS: &[FormatPreset] = &[
    FormatPreset {
        name: "All-In TheNydus",
        url: "https://sites.google.com/site/allinthenydus",
        format: team_league(7, true),
        min_sets: 4,
    },
    FormatPreset {
        name: "Chobo Team League",
        url: "http://www.choboteamleague.com",
        format: team_league(8, false),
        min_sets: 8,
    },
    FormatPreset {
        name: "Koprulu Team League",
        url: "http://koprululeague.forumactif.org",
        format: team_league(7, true),
        min_sets: 4,
    },
    FormatPreset {
        name: "Validity Star League",
        url: "http://liquipedia.net/starcraft2/Validity_Star_League",
        format: team_league(7, true),
        min_sets: 4,
    },
    FormatPreset {
        name: "WardiTV Team League Season 8",
        url: "http://liquipedia.net/starcraft2/WardiTV_Team_League_S8",
        format: team_league(7, true),
        min_sets: 4,
    },
];

pub fn find(name: &str) -> Option<&'static FormatPreset> {
    PRESETS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}
