//! The standard game registry.
//!
//! 83 categories covering game outcome, periods, team props, player props
//! and specials. Order is significant: it is the order repair appends
//! missing categories in.

use crate::registry::CategoryDescriptor;

const SIDES: [(&str, &str); 2] = [("home", "Home"), ("away", "Away")];

const PERIODS: [(&str, &str, f64); 6] = [
    ("q1", "1st Quarter", 10.5),
    ("q2", "2nd Quarter", 13.5),
    ("q3", "3rd Quarter", 10.5),
    ("q4", "4th Quarter", 12.5),
    ("h1", "1st Half", 23.5),
    ("h2", "2nd Half", 21.5),
];

/// Team props per side: (suffix, numeric placeholder or None for binary, tags).
const TEAM_PROPS: [(&str, Option<f64>, &[&str]); 15] = [
    ("points", Some(22.5), &["scoring"]),
    ("touchdowns", Some(2.5), &["scoring"]),
    ("field_goals", Some(1.5), &["special_teams", "scoring"]),
    ("passing_yards", Some(235.5), &["passing"]),
    ("rushing_yards", Some(115.5), &["rushing"]),
    ("turnovers", Some(1.5), &["defense"]),
    ("sacks", Some(2.5), &["defense"]),
    ("penalties", Some(6.5), &["discipline"]),
    ("time_of_possession", Some(30.0), &["rushing"]),
    ("third_down_pct", Some(40.0), &["efficiency"]),
    ("red_zone_td_pct", Some(55.0), &["efficiency", "scoring"]),
    ("first_downs", Some(19.5), &["efficiency"]),
    ("longest_td", Some(35.5), &["big_play"]),
    ("scores_first_half", None, &["scoring"]),
    ("two_point_attempt", None, &["coaching"]),
];

/// Player props per side: (position, stat, placeholder, tags).
const PLAYER_PROPS: [(&str, &str, Option<f64>, &[&str]); 11] = [
    ("qb", "passing_yards", Some(245.5), &["player_props", "passing"]),
    ("qb", "passing_tds", Some(1.5), &["player_props", "passing"]),
    ("qb", "interceptions", Some(0.5), &["player_props", "passing", "defense"]),
    ("qb", "completions", Some(21.5), &["player_props", "passing"]),
    ("qb", "rushing_yards", Some(15.5), &["player_props", "rushing"]),
    ("rb", "rushing_yards", Some(65.5), &["player_props", "rushing"]),
    ("rb", "rushing_attempts", Some(15.5), &["player_props", "rushing"]),
    ("rb", "receptions", Some(2.5), &["player_props", "receiving"]),
    ("wr", "receiving_yards", Some(70.5), &["player_props", "receiving"]),
    ("wr", "receptions", Some(5.5), &["player_props", "receiving"]),
    ("wr", "anytime_td", None, &["player_props", "receiving", "scoring"]),
];

/// Build the standard category list.
pub fn categories() -> Vec<CategoryDescriptor> {
    let mut categories = Vec::with_capacity(83);

    // Game outcome
    categories.extend([
        CategoryDescriptor::enumerated("game.winner", "Game", &["home", "away"])
            .with_tags(&["game"]),
        CategoryDescriptor::binary("game.spread_cover", "Home team vs spread")
            .with_tags(&["game", "spread"]),
        CategoryDescriptor::binary("game.total_over", "Game total").with_tags(&["totals"]),
        CategoryDescriptor::numeric("game.total_points", "Game", 44.5).with_tags(&["totals"]),
        CategoryDescriptor::numeric("game.margin", "Home team", 3.5)
            .with_tags(&["game", "spread"]),
        CategoryDescriptor::binary("game.overtime", "Game").with_tags(&["game"]),
        CategoryDescriptor::enumerated("game.first_score_team", "Game", &["home", "away"])
            .with_tags(&["scoring"]),
        CategoryDescriptor::enumerated(
            "game.first_score_type",
            "Game",
            &["touchdown", "field_goal", "safety"],
        )
        .with_tags(&["scoring"]),
        CategoryDescriptor::enumerated("game.last_score_team", "Game", &["home", "away"])
            .with_tags(&["scoring"]),
        CategoryDescriptor::enumerated(
            "game.highest_scoring_quarter",
            "Game",
            &["q1", "q2", "q3", "q4"],
        )
        .with_tags(&["totals"]),
    ]);

    // Periods
    for (period, subject, total) in PERIODS {
        categories.push(
            CategoryDescriptor::enumerated(format!("{period}.winner"), subject, &["home", "away", "tie"])
                .with_tags(&["periods"]),
        );
        categories.push(
            CategoryDescriptor::numeric(format!("{period}.total"), subject, total)
                .with_tags(&["periods", "totals"]),
        );
        categories.push(
            CategoryDescriptor::binary(format!("{period}.total_over"), subject)
                .with_tags(&["periods", "totals"]),
        );
    }

    // Team props
    for (side, label) in SIDES {
        for (stat, placeholder, tags) in TEAM_PROPS {
            let id = format!("{side}.{stat}");
            let subject = format!("{label} team");
            let descriptor = match placeholder {
                Some(value) => CategoryDescriptor::numeric(id, subject, value),
                None => CategoryDescriptor::binary(id, subject),
            };
            categories.push(descriptor.with_tags(tags));
        }
    }

    // Player props
    for (side, label) in SIDES {
        for (position, stat, placeholder, tags) in PLAYER_PROPS {
            let id = format!("{side}.{position}.{stat}");
            let subject = format!("{label} {}", position.to_uppercase());
            let descriptor = match placeholder {
                Some(value) => CategoryDescriptor::numeric(id, subject, value),
                None => CategoryDescriptor::binary(id, subject),
            };
            categories.push(descriptor.with_tags(tags));
        }
    }

    // Specials
    categories.extend([
        CategoryDescriptor::binary("special.defensive_td", "Game").with_tags(&["defense"]),
        CategoryDescriptor::binary("special.safety", "Game").with_tags(&["defense"]),
        CategoryDescriptor::binary("special.missed_extra_point", "Game")
            .with_tags(&["special_teams"]),
    ]);

    categories
}
