use crate::StateError;

/// Merges two messages addressed to the same vertex through the same scope.
///
/// Implementations must be associative and commutative: messages arrive in no particular order.
pub trait MessageCombiner<M>: Send + Sync {
    fn combine(&self, a: M, b: M) -> M;
}

impl<M, F> MessageCombiner<M> for F
where
    F: Fn(M, M) -> M + Send + Sync,
{
    fn combine(&self, a: M, b: M) -> M {
        self(a, b)
    }
}

/// Merges `msg` into an already buffered message, failing if a merge is needed but no combiner
/// was supplied.
pub fn combine_into<M>(
    combiner: Option<&dyn MessageCombiner<M>>,
    existing: Option<M>,
    msg: M,
) -> Result<M, StateError> {
    match (existing, combiner) {
        (None, _) => Ok(msg),
        (Some(existing), Some(combiner)) => Ok(combiner.combine(existing, msg)),
        (Some(_), None) => Err(StateError::CombinerRequired),
    }
}

/// Folds a sequence of messages into at most one.
pub fn fold_messages<M>(
    combiner: Option<&dyn MessageCombiner<M>>,
    messages: impl IntoIterator<Item = M>,
) -> Result<Option<M>, StateError> {
    messages
        .into_iter()
        .try_fold(None, |acc, msg| combine_into(combiner, acc, msg).map(Some))
}
