use crate::state::memory::MemoryOperator;
use strata_api::core::entities::properties::prop::PropType;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error("Vertex compute key [{0}] has not been declared by the vertex program")]
    UndeclaredComputeKey(String),
    #[error("Memory key [{0}] has not been declared")]
    UndeclaredMemoryKey(String),
    #[error("Message scope {0} is not active in the current superstep")]
    UndeclaredScope(String),
    #[error("A message combiner is required to merge more than one message for the same vertex and scope")]
    CombinerRequired,
    #[error("Memory operator {operator:?} on key [{key}] cannot reduce {current} with {value}")]
    OperatorTypeMismatch {
        key: String,
        operator: MemoryOperator,
        current: PropType,
        value: PropType,
    },
    #[error("Memory key [{0}] can only be added to while vertices are executing")]
    AddOutsideExecution(String),
    #[error("Memory key [{0}] can not be set while vertices are executing")]
    SetDuringExecution(String),
}
