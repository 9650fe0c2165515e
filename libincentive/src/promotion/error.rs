use crate::ids::UpdateId;
use crate::points::PointsError;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RelationError {
    #[error("The relation refers to dimension {dimension}, but the points only have {dimensions} dimensions")]
    DimensionOutOfRange { dimension: usize, dimensions: usize },
    #[error("Point arithmetic failed: {0}")]
    Points(#[from] PointsError),
    #[error("The update timestamp cannot be represented as a day number")]
    InvalidTimestamp,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PromotionError {
    #[error("Contribution rule refers to dimension {dimension}, but the promotion only has {dimensions} dimensions")]
    InvalidContributionDimension { dimension: usize, dimensions: usize },
    #[error("A cents-per-point rate of zero is not allowed")]
    ZeroRate,
    #[error("The basket contribution overflowed")]
    ContributionOverflow,
    #[error("The promotion has no update rule {0}")]
    UnknownUpdate(UpdateId),
    #[error("Update {0} is not satisfiable with the current points and basket")]
    Infeasible(UpdateId),
    #[error("Update {update_id} is satisfied by {candidates} different point vectors")]
    Ambiguous { update_id: UpdateId, candidates: usize },
    #[error("The feasibility predicate of update {update_id} failed: {source}")]
    Relation { update_id: UpdateId, source: RelationError },
}
