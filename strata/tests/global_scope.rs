use pretty_assertions::assert_eq;
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use std::sync::Arc;
use strata::prelude::*;

const TOTAL: &str = "total";
const DEGREE: &str = "degree";

fn path(n: u64) -> InMemoryGraph {
    let graph = InMemoryGraph::with_max_workers(4);
    for v in 1..n {
        graph.add_edge(v, v + 1, "next");
    }
    graph
}

/// Every vertex reports its id to vertex 1 and pings its neighbours
struct Report {
    scopes: Vec<MessageScope<i64>>,
    combine: bool,
}

impl Report {
    fn new(combine: bool) -> Self {
        Self {
            scopes: vec![
                MessageScope::global([VID(1)]),
                MessageScope::local(Direction::BOTH),
            ],
            combine,
        }
    }
}

impl VertexProgram<i64> for Report {
    fn execute(
        &self,
        vertex: &EvalVertexView<'_, i64>,
        memory: &ComputerMemory,
    ) -> Result<(), ProgramError> {
        let [global, local] = [&self.scopes[0], &self.scopes[1]];
        if memory.is_initial_iteration() {
            vertex.send_message(global, vertex.id().as_u64() as i64)?;
            vertex.send_message(local, 1)?;
        } else {
            let received = vertex.receive_messages(global)?;
            if let Some(total) = received.into_iter().next() {
                vertex.set_property(Cardinality::Single, TOTAL, total)?;
            }
            let degree: i64 = vertex.receive_messages(local)?.into_iter().sum();
            vertex.set_property(Cardinality::Single, DEGREE, degree)?;
        }
        Ok(())
    }

    fn terminate(&self, memory: &ComputerMemory) -> Result<bool, ProgramError> {
        Ok(!memory.is_initial_iteration())
    }

    fn vertex_compute_keys(&self) -> Vec<VertexComputeKey> {
        vec![
            VertexComputeKey::persistent(TOTAL),
            VertexComputeKey::persistent(DEGREE),
        ]
    }

    fn message_scopes(&self, _memory: &ComputerMemory) -> Vec<MessageScope<i64>> {
        self.scopes.clone()
    }

    fn message_combiner(&self) -> Option<Arc<dyn MessageCombiner<i64>>> {
        if self.combine {
            Some(Arc::new(|a: i64, b: i64| a + b))
        } else {
            None
        }
    }
}

#[test]
fn global_and_local_messages_use_separate_slots() {
    let graph = path(4);
    let factory = ComputerFactory::new(Arc::new(graph.clone()), ComputerConfig::default());
    let mut computer = factory.compute();
    computer
        .program(Report::new(true))
        .unwrap()
        .workers(2)
        .unwrap()
        .result_mode(ResultMode::Persist);
    computer.submit().unwrap();

    assert_eq!(graph.property(VID(1), TOTAL), Some(Prop::I64(10)));
    for v in 2..=4 {
        assert_eq!(graph.property(VID(v), TOTAL), None);
    }
    let degrees: Vec<_> = (1..=4)
        .map(|v| graph.property(VID(v), DEGREE).and_then(|d| d.as_i64()))
        .collect();
    assert_eq!(degrees, vec![Some(1), Some(2), Some(2), Some(1)]);
}

#[test]
fn converging_global_messages_need_a_combiner() {
    let factory = ComputerFactory::new(Arc::new(path(4)), ComputerConfig::default());
    let mut computer = factory.compute();
    computer.program(Report::new(false)).unwrap();
    // only the first of the four reports can be stored
    assert!(matches!(
        computer.submit(),
        Err(ComputerError::VertexProgramFailure {
            iteration: 0,
            failures: 3
        })
    ));
}

/// Sends through a scope it never declares
struct Undeclared;

impl VertexProgram<i64> for Undeclared {
    fn execute(
        &self,
        vertex: &EvalVertexView<'_, i64>,
        _memory: &ComputerMemory,
    ) -> Result<(), ProgramError> {
        vertex.send_message(&MessageScope::global([VID(1)]), 1)?;
        Ok(())
    }

    fn terminate(&self, _memory: &ComputerMemory) -> Result<bool, ProgramError> {
        Ok(true)
    }

    fn message_scopes(&self, _memory: &ComputerMemory) -> Vec<MessageScope<i64>> {
        vec![MessageScope::local(Direction::OUT)]
    }

    fn message_combiner(&self) -> Option<Arc<dyn MessageCombiner<i64>>> {
        Some(Arc::new(|a: i64, b: i64| a + b))
    }
}

#[test]
fn sending_through_an_undeclared_scope_fails() {
    let factory = ComputerFactory::new(Arc::new(path(4)), ComputerConfig::default());
    let mut computer = factory.compute();
    computer.program(Undeclared).unwrap();
    assert!(matches!(
        computer.submit(),
        Err(ComputerError::VertexProgramFailure {
            iteration: 0,
            failures: 4
        })
    ));
}

/// Sums a property of all vertices at vertex 1, checking nothing arrives early
struct Collect;

impl VertexProgram<i64> for Collect {
    fn setup(&self, memory: &ComputerMemory) -> Result<(), ProgramError> {
        memory.set("early", false)?;
        Ok(())
    }

    fn execute(
        &self,
        vertex: &EvalVertexView<'_, i64>,
        memory: &ComputerMemory,
    ) -> Result<(), ProgramError> {
        let scope = MessageScope::global([VID(1)]);
        let received = vertex.receive_messages(&scope)?;
        if memory.is_initial_iteration() {
            memory.add("early", !received.is_empty())?;
            let value = vertex.property("value")?.and_then(|v| v.as_i64());
            vertex.send_message(&scope, value.unwrap_or(0))?;
        } else if let Some(total) = received.into_iter().next() {
            vertex.set_property(Cardinality::Single, TOTAL, total)?;
        }
        Ok(())
    }

    fn terminate(&self, memory: &ComputerMemory) -> Result<bool, ProgramError> {
        Ok(!memory.is_initial_iteration())
    }

    fn vertex_compute_keys(&self) -> Vec<VertexComputeKey> {
        vec![VertexComputeKey::persistent(TOTAL)]
    }

    fn memory_compute_keys(&self) -> Vec<MemoryComputeKey> {
        vec![MemoryComputeKey::new("early", MemoryOperator::Or, false)]
    }

    fn message_scopes(&self, _memory: &ComputerMemory) -> Vec<MessageScope<i64>> {
        vec![MessageScope::global([VID(1)])]
    }

    fn message_combiner(&self) -> Option<Arc<dyn MessageCombiner<i64>>> {
        Some(Arc::new(|a: i64, b: i64| a + b))
    }
}

#[quickcheck]
fn messages_are_only_visible_in_the_next_superstep(values: Vec<u8>) -> TestResult {
    if values.is_empty() {
        return TestResult::discard();
    }
    let values = &values[..values.len().min(32)];
    let graph = InMemoryGraph::with_max_workers(4);
    for (v, value) in (1u64..).zip(values) {
        graph.add_vertex(v, [("value", *value as i64)]);
    }
    let factory = ComputerFactory::new(Arc::new(graph.clone()), ComputerConfig::default());
    let mut computer = factory.compute();
    computer
        .program(Collect)
        .unwrap()
        .workers(3)
        .unwrap()
        .result_mode(ResultMode::Persist);
    let result = computer.submit().unwrap();

    let expected: i64 = values.iter().map(|v| *v as i64).sum();
    TestResult::from_bool(
        result.memory().get("early") == Some(&Prop::Bool(false))
            && graph.property(VID(1), TOTAL) == Some(Prop::I64(expected)),
    )
}
