//! Typed description of the record collections and the fields the hooks touch.
//!
//! Storage keeps records as JSON objects keyed by field name. Everything that
//! reads or writes a field goes through [`Field`], so a misspelled field name
//! is a compile error rather than a silently empty value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// All collections of the tournament schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    TournamentOrganizer,
    AgeGroups,
    Clubs,
    Competitions,
    Courts,
    Gymnasiums,
    MatchData,
    MatchSets,
    Players,
    PlayingLevels,
    Teams,
    TieBreakers,
    TournamentModeSettings,
    Tournaments,
}

impl Collection {
    pub const ALL: [Collection; 14] = [
        Collection::TournamentOrganizer,
        Collection::AgeGroups,
        Collection::Clubs,
        Collection::Competitions,
        Collection::Courts,
        Collection::Gymnasiums,
        Collection::MatchData,
        Collection::MatchSets,
        Collection::Players,
        Collection::PlayingLevels,
        Collection::Teams,
        Collection::TieBreakers,
        Collection::TournamentModeSettings,
        Collection::Tournaments,
    ];

    /// Storage name of the collection.
    pub const fn name(self) -> &'static str {
        match self {
            Collection::TournamentOrganizer => "tournament_organizer",
            Collection::AgeGroups => "age_groups",
            Collection::Clubs => "clubs",
            Collection::Competitions => "competitions",
            Collection::Courts => "courts",
            Collection::Gymnasiums => "gymnasiums",
            Collection::MatchData => "match_data",
            Collection::MatchSets => "match_sets",
            Collection::Players => "players",
            Collection::PlayingLevels => "playing_levels",
            Collection::Teams => "teams",
            Collection::TieBreakers => "tie_breakers",
            Collection::TournamentModeSettings => "tournament_mode_settings",
            Collection::Tournaments => "tournaments",
        }
    }

    /// Relation fields declared on this collection.
    pub fn relations(self) -> impl Iterator<Item = &'static Relation> {
        RELATIONS.iter().filter(move |r| r.source() == self)
    }

    /// Relation fields of other collections that point at this collection.
    pub fn referenced_by(self) -> impl Iterator<Item = &'static Relation> {
        RELATIONS.iter().filter(move |r| r.target == self)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown collection: {0}")]
pub struct UnknownCollection(pub String);

impl FromStr for Collection {
    type Err = UnknownCollection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| UnknownCollection(s.to_string()))
    }
}

/// Fields read or written by the hooks, qualified by their owning collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    // tournaments
    UseAgeGroups,
    UsePlayingLevels,
    // competitions
    AgeGroup,
    PlayingLevel,
    Registrations,
    Draw,
    Seeds,
    TournamentModeSettings,
    GenderCategory,
    TeamSize,
    Matches,
    TieBreakers,
    // teams
    TeamPlayers,
    // match_data
    Sets,
    Court,
    WithdrawnTeams,
    EndTime,
    // match_sets
    Team1Points,
    Team2Points,
    // courts
    Gymnasium,
    // players
    Club,
    // tie_breakers
    TieBreakerRanking,
}

impl Field {
    /// Key of the field inside a record's data object.
    pub const fn name(self) -> &'static str {
        match self {
            Field::UseAgeGroups => "useAgeGroups",
            Field::UsePlayingLevels => "usePlayingLevels",
            Field::AgeGroup => "ageGroup",
            Field::PlayingLevel => "playingLevel",
            Field::Registrations => "registrations",
            Field::Draw => "draw",
            Field::Seeds => "seeds",
            Field::TournamentModeSettings => "tournamentModeSettings",
            Field::GenderCategory => "genderCategory",
            Field::TeamSize => "teamSize",
            Field::Matches => "matches",
            Field::TieBreakers => "tieBreakers",
            Field::TeamPlayers => "players",
            Field::Sets => "sets",
            Field::Court => "court",
            Field::WithdrawnTeams => "withdrawnTeams",
            Field::EndTime => "endTime",
            Field::Team1Points => "team1Points",
            Field::Team2Points => "team2Points",
            Field::Gymnasium => "gymnasium",
            Field::Club => "club",
            Field::TieBreakerRanking => "tieBreakerRanking",
        }
    }

    /// The collection that declares this field.
    pub const fn collection(self) -> Collection {
        match self {
            Field::UseAgeGroups | Field::UsePlayingLevels => Collection::Tournaments,
            Field::AgeGroup
            | Field::PlayingLevel
            | Field::Registrations
            | Field::Draw
            | Field::Seeds
            | Field::TournamentModeSettings
            | Field::GenderCategory
            | Field::TeamSize
            | Field::Matches
            | Field::TieBreakers => Collection::Competitions,
            Field::TeamPlayers => Collection::Teams,
            Field::Sets | Field::Court | Field::WithdrawnTeams | Field::EndTime => {
                Collection::MatchData
            }
            Field::Team1Points | Field::Team2Points => Collection::MatchSets,
            Field::Gymnasium => Collection::Courts,
            Field::Club => Collection::Players,
            Field::TieBreakerRanking => Collection::TieBreakers,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.collection(), self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    Single,
    Multiple,
}

/// One relation field: `field` of `field.collection()` references records of `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Relation {
    pub field: Field,
    pub target: Collection,
    pub cardinality: Cardinality,
}

impl Relation {
    const fn single(field: Field, target: Collection) -> Self {
        Self {
            field,
            target,
            cardinality: Cardinality::Single,
        }
    }

    const fn multiple(field: Field, target: Collection) -> Self {
        Self {
            field,
            target,
            cardinality: Cardinality::Multiple,
        }
    }

    pub const fn source(&self) -> Collection {
        self.field.collection()
    }

    pub const fn is_multiple(&self) -> bool {
        matches!(self.cardinality, Cardinality::Multiple)
    }
}

/// Every relation field of the schema.
pub static RELATIONS: [Relation; 15] = [
    Relation::single(Field::AgeGroup, Collection::AgeGroups),
    Relation::single(Field::PlayingLevel, Collection::PlayingLevels),
    Relation::multiple(Field::Registrations, Collection::Teams),
    Relation::single(Field::TournamentModeSettings, Collection::TournamentModeSettings),
    Relation::multiple(Field::Seeds, Collection::Teams),
    Relation::multiple(Field::Draw, Collection::Teams),
    Relation::multiple(Field::Matches, Collection::MatchData),
    Relation::multiple(Field::TieBreakers, Collection::TieBreakers),
    Relation::single(Field::Gymnasium, Collection::Gymnasiums),
    Relation::multiple(Field::Sets, Collection::MatchSets),
    Relation::single(Field::Court, Collection::Courts),
    Relation::multiple(Field::WithdrawnTeams, Collection::Teams),
    Relation::single(Field::Club, Collection::Clubs),
    Relation::multiple(Field::TeamPlayers, Collection::Players),
    Relation::multiple(Field::TieBreakerRanking, Collection::Teams),
];

/// Looks up the relation declared by `field`, if it is a relation field.
pub fn relation(field: Field) -> Option<&'static Relation> {
    RELATIONS.iter().find(|r| r.field == field)
}

/// Relations whose updates cascade to the records that reference them.
///
/// Team updates reach competitions through the registrations list by a
/// dedicated team hook instead, so that relation is left out here.
pub fn cascading_relations() -> impl Iterator<Item = &'static Relation> {
    RELATIONS.iter().filter(|r| r.field != Field::Registrations)
}
