pub mod competition;
pub mod record;
pub mod results;
pub mod schema;

pub use competition::{
    find_double_registrations, group_competitions, group_of_competition, merge_registrations,
    merge_target, Categorization, CompetitionGroup, CompetitionType, GenderCategory,
    RegistrationMerge,
};
pub use record::{generate_record_id, Expanded, Record};
pub use results::{pair_scores, ScoreError, SetScore};
pub use schema::{
    cascading_relations, relation, Cardinality, Collection, Field, Relation, UnknownCollection,
    RELATIONS,
};
