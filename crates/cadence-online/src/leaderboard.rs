//! Online leaderboard requests and response parsing.

use cadence_proto::Md5Hash;

use crate::api::percent_encode;

/// Leaderboard header fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnlineMapInfo {
    pub ranked_status: i32,
    pub server_has_osz2: bool,
    pub map_id: i32,
    pub set_id: i32,
    pub nb_scores: i32,
    pub online_offset: i32,
}

/// One score line of an online leaderboard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnlineScore {
    pub score_id: u64,
    pub player_name: String,
    pub score: u64,
    pub max_combo: i32,
    pub num50: i32,
    pub num100: i32,
    pub num300: i32,
    pub num_miss: i32,
    pub num_katu: i32,
    pub num_geki: i32,
    pub perfect: bool,
    pub mods: i32,
    pub player_id: i32,
    pub unix_timestamp: i64,
    pub map_md5: Md5Hash,
    /// Server the score was fetched from.
    pub server: String,
}

/// Minimum number of `|`-separated fields in a score line.
const SCORE_FIELDS: usize = 15;

fn num<T: std::str::FromStr + Default>(s: &str) -> T {
    s.trim().parse().unwrap_or_default()
}

/// Parse one score line. Lines with too few fields yield `None`.
pub fn parse_score(line: &str) -> Option<OnlineScore> {
    let tokens: Vec<&str> = line.split('|').collect();
    if tokens.len() < SCORE_FIELDS {
        return None;
    }
    Some(OnlineScore {
        score_id: num(tokens[0]),
        player_name: tokens[1].to_string(),
        score: num(tokens[2]),
        max_combo: num(tokens[3]),
        num50: num(tokens[4]),
        num100: num(tokens[5]),
        num300: num(tokens[6]),
        num_miss: num(tokens[7]),
        num_katu: num(tokens[8]),
        num_geki: num(tokens[9]),
        perfect: num::<u32>(tokens[10]) == 1,
        mods: num(tokens[11]),
        player_id: num(tokens[12]),
        // tokens[13] is the rank
        unix_timestamp: num(tokens[14]),
        ..Default::default()
    })
}

/// Parse a leaderboard response body.
///
/// ```text
/// status|has_osz2|map_id|set_id|nb_scores|fa_track|fa_license
/// online_offset
/// map name
/// ratings
/// personal best
/// score lines...
/// ```
pub fn parse_leaderboard(body: &str, map_md5: &Md5Hash, server: &str) -> (OnlineMapInfo, Vec<OnlineScore>) {
    let mut lines = body.split('\n');
    let mut info = OnlineMapInfo::default();

    if let Some(header) = lines.next() {
        let fields: Vec<&str> = header.split('|').collect();
        let field = |i: usize| fields.get(i).copied().unwrap_or("");
        info.ranked_status = num(field(0));
        info.server_has_osz2 = field(1) == "true";
        info.map_id = num(field(2));
        info.set_id = num(field(3));
        info.nb_scores = num(field(4));
    }
    info.online_offset = lines.next().map(num::<i32>).unwrap_or_default();

    // map name, ratings, personal best
    let scores = lines
        .skip(3)
        .take_while(|line| !line.is_empty())
        .filter_map(parse_score)
        .map(|mut score| {
            score.map_md5 = map_md5.clone();
            score.server = server.to_string();
            score
        })
        .collect();
    (info, scores)
}

/// Query path of the leaderboard of one difficulty, without credentials
/// (`us`/`ha`).
pub fn leaderboard_path(map_md5: &Md5Hash, file_name: &str, set_id: i32, mods: u32) -> String {
    format!(
        "/web/osu-osz2-getscores.php?s=0&vv=4&v=1&c={map_md5}&f={}&m=0&i={set_id}&mods={mods}&h=&a=0",
        percent_encode(file_name),
    )
}
