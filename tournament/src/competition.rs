//! Competition grouping and the registration merge.
//!
//! Competitions that only differ in a category dimension that is being removed
//! collapse into one. [`group_competitions`] finds the candidates,
//! [`merge_target`] picks the survivor of a group and [`merge_registrations`]
//! decides which teams survive so that no player ends up registered twice.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::record::Record;
use crate::schema::{Collection, Field};

/// A categorization dimension that can be switched on for the tournament.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Categorization {
    AgeGroups,
    PlayingLevels,
}

impl Categorization {
    pub const ALL: [Categorization; 2] = [Categorization::AgeGroups, Categorization::PlayingLevels];

    /// Competition field holding the category id.
    pub const fn field(self) -> Field {
        match self {
            Categorization::AgeGroups => Field::AgeGroup,
            Categorization::PlayingLevels => Field::PlayingLevel,
        }
    }

    /// Collection of the category records.
    pub const fn collection(self) -> Collection {
        match self {
            Categorization::AgeGroups => Collection::AgeGroups,
            Categorization::PlayingLevels => Collection::PlayingLevels,
        }
    }

    /// Tournament option that switches the categorization on.
    pub const fn option(self) -> Field {
        match self {
            Categorization::AgeGroups => Field::UseAgeGroups,
            Categorization::PlayingLevels => Field::UsePlayingLevels,
        }
    }

    pub const fn other(self) -> Self {
        match self {
            Categorization::AgeGroups => Categorization::PlayingLevels,
            Categorization::PlayingLevels => Categorization::AgeGroups,
        }
    }

    /// The categorization whose categories live in `collection`.
    pub fn of_collection(collection: Collection) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.collection() == collection)
    }
}

impl fmt::Display for Categorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection().name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenderCategory {
    Female,
    Male,
    Mixed,
    Any,
}

impl GenderCategory {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "female" => Some(GenderCategory::Female),
            "male" => Some(GenderCategory::Male),
            "mixed" => Some(GenderCategory::Mixed),
            "any" => Some(GenderCategory::Any),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompetitionType {
    Singles,
    Doubles,
    Mixed,
}

impl CompetitionType {
    pub fn of(gender_category: Option<GenderCategory>, team_size: i64) -> Self {
        if team_size == 1 {
            CompetitionType::Singles
        } else if gender_category == Some(GenderCategory::Mixed) {
            CompetitionType::Mixed
        } else {
            CompetitionType::Doubles
        }
    }
}

/// Grouping key: competitions with equal keys are the same discipline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompetitionGroup {
    /// Stored gender category, unparsed: unknown values stay distinct.
    pub gender_category: String,
    pub competition_type: CompetitionType,
    /// Id of the expanded category record, `None` when uncategorized or when
    /// the grouping ignores categories.
    pub category: Option<String>,
}

impl fmt::Display for CompetitionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{:?}/{}",
            self.gender_category,
            self.competition_type,
            self.category.as_deref().unwrap_or("none")
        )
    }
}

/// The group a competition belongs to. With `categorization == None` the
/// category is ignored.
pub fn group_of_competition(
    competition: &Record,
    categorization: Option<Categorization>,
) -> CompetitionGroup {
    let gender_category = competition.get_str(Field::GenderCategory);
    let competition_type = CompetitionType::of(
        GenderCategory::parse(gender_category),
        competition.get_int(Field::TeamSize),
    );
    let category = categorization
        .and_then(|c| competition.expanded_one(c.field()))
        .map(|category| category.id.clone());

    CompetitionGroup {
        gender_category: gender_category.to_string(),
        competition_type,
        category,
    }
}

/// Partition competitions by their [`CompetitionGroup`].
///
/// Groups come out in the order their first member appears in the input;
/// callers must not rely on any particular group order.
pub fn group_competitions<T, I>(competitions: I, categorization: Option<Categorization>) -> Vec<Vec<T>>
where
    T: Borrow<Record>,
    I: IntoIterator<Item = T>,
{
    let mut index: HashMap<CompetitionGroup, usize> = HashMap::new();
    let mut groups: Vec<Vec<T>> = Vec::new();

    for competition in competitions {
        let key = group_of_competition(competition.borrow(), categorization);
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(Vec::with_capacity(3));
            groups.len() - 1
        });
        groups[slot].push(competition);
    }

    groups
}

/// Returns the one record of `records` with an expanded value under `field`,
/// or `None` when zero or several have one.
fn single_with(records: &[Record], field: Field) -> Option<usize> {
    let mut found = None;
    for (i, record) in records.iter().enumerate() {
        if record.expanded_one(field).is_some() {
            if found.is_some() {
                return None;
            }
            found = Some(i);
        }
    }
    found
}

/// Index of the competition the rest of `group` merges into.
///
/// The first competition that is the only one with registrations, a draw,
/// seeds or tournament mode settings (in that order) wins, else the first.
pub fn merge_target(group: &[Record]) -> usize {
    if group.len() <= 1 {
        return 0;
    }

    [
        Field::Registrations,
        Field::Draw,
        Field::Seeds,
        Field::TournamentModeSettings,
    ]
    .into_iter()
    .find_map(|field| single_with(group, field))
    .unwrap_or(0)
}

/// Outcome of merging the registration lists of a competition group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationMerge {
    /// Existing teams kept as they are.
    pub adopted: Vec<Record>,
    /// Fresh single-player teams for players whose team was rejected.
    pub created: Vec<Record>,
    /// Rejected teams.
    pub deleted: Vec<Record>,
}

impl RegistrationMerge {
    /// Ids of the merged registration list: adopted teams, then new ones.
    pub fn registration_ids(&self) -> Vec<String> {
        self.adopted
            .iter()
            .chain(self.created.iter())
            .map(|team| team.id.clone())
            .collect()
    }
}

/// Merge the expanded registrations of all competitions in `group` into one
/// list without double registrations.
///
/// Teams are considered target first, then the others in group order. A team
/// is adopted when none of its players is already adopted. Every player left
/// over gets a new single-player team and every rejected team is deleted.
pub fn merge_registrations(group: &[Record], target: usize) -> RegistrationMerge {
    let mut all_teams: Vec<&Record> = Vec::new();
    if let Some(t) = group.get(target) {
        all_teams.extend(t.expanded_all(Field::Registrations));
    }
    for (i, competition) in group.iter().enumerate() {
        if i != target {
            all_teams.extend(competition.expanded_all(Field::Registrations));
        }
    }

    let mut merge = RegistrationMerge::default();
    if all_teams.is_empty() {
        return merge;
    }

    let mut adopted_players: HashSet<String> = HashSet::new();
    let mut adopted_teams: HashSet<&str> = HashSet::new();

    // Adopt every team that does not register a player twice
    for team in &all_teams {
        let players = team.get_string_list(Field::TeamPlayers);
        if players.iter().any(|p| adopted_players.contains(p)) {
            continue;
        }
        adopted_players.extend(players);
        adopted_teams.insert(team.id.as_str());
        merge.adopted.push((*team).clone());
    }

    // New team for each player that lost their team
    let mut seen_players: HashSet<String> = HashSet::new();
    for team in &all_teams {
        for player in team.get_string_list(Field::TeamPlayers) {
            if adopted_players.contains(&player) || !seen_players.insert(player.clone()) {
                continue;
            }
            let mut new_team = Record::new(Collection::Teams);
            new_team.set_ids(Field::TeamPlayers, [player]);
            merge.created.push(new_team);
        }
    }

    let mut deleted_ids: HashSet<&str> = HashSet::new();
    for team in &all_teams {
        if !adopted_teams.contains(team.id.as_str()) && deleted_ids.insert(team.id.as_str()) {
            merge.deleted.push((*team).clone());
        }
    }

    merge
}

/// Teams in `registered` (other than `team` itself) that share a player with `team`.
pub fn find_double_registrations<'a>(registered: &'a [Record], team: &Record) -> Vec<&'a Record> {
    let members: HashSet<String> = team.get_string_list(Field::TeamPlayers).into_iter().collect();

    registered
        .iter()
        .filter(|other| other.id != team.id)
        .filter(|other| {
            other
                .get_string_list(Field::TeamPlayers)
                .iter()
                .any(|p| members.contains(p))
        })
        .collect()
}
