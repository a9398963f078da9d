use crate::handlers::{BpmnStepContext, Handle};
use crate::output::{KeyGenerator, PendingRecord, RecordWriter};
use crate::processor::resolve_element;
use crate::state::{ElementInstance, EngineState};
use bpmncore::{
    ExecutableProcess, Intent, Key, LifecycleState, ProcessDefinition, Result,
    WorkflowInstanceRecord,
};
use chrono::{DateTime, Utc};

pub(crate) const WORKFLOW_KEY: Key = 100;
pub(crate) const INSTANCE_KEY: Key = 1;

/// One compiled process plus partition state, for driving single handlers.
pub(crate) struct Fixture {
    pub process: ExecutableProcess,
    pub state: EngineState,
    pub keys: KeyGenerator,
}

impl Fixture {
    pub fn new(definition: ProcessDefinition) -> Self {
        let process = ExecutableProcess::compile(WORKFLOW_KEY, 1, &definition)
            .expect("test process should compile");
        Self {
            process,
            state: EngineState::new(DateTime::<Utc>::UNIX_EPOCH),
            keys: KeyGenerator::starting_at(1_000),
        }
    }

    /// Value of `element_id` in the test instance, typed from the catalog.
    pub fn value(&self, element_id: &str, flow_scope_key: Option<Key>) -> WorkflowInstanceRecord {
        let element = self
            .process
            .element(element_id)
            .expect("element should exist");
        WorkflowInstanceRecord {
            bpmn_process_id: self.process.bpmn_process_id.clone(),
            workflow_key: WORKFLOW_KEY,
            version: 1,
            workflow_instance_key: INSTANCE_KEY,
            element_id: element_id.to_string(),
            bpmn_element_type: element.element_type,
            flow_scope_key,
        }
    }

    /// Create an instance, holding a token in its flow scope like a real child would.
    pub fn add_instance(
        &mut self,
        key: Key,
        element_id: &str,
        flow_scope_key: Option<Key>,
        state: LifecycleState,
    ) {
        let value = self.value(element_id, flow_scope_key);
        self.state
            .instances
            .new_instance(key, value, state)
            .expect("flow scope should exist");
        if let Some(scope_key) = flow_scope_key {
            self.state
                .instances
                .spawn_token(scope_key)
                .expect("flow scope should exist");
        }
    }

    pub fn instance(&self, key: Key) -> &ElementInstance {
        self.state
            .instances
            .get_instance(key)
            .expect("instance should exist")
    }

    pub fn token_count(&self, key: Key) -> u32 {
        self.instance(key).token_count()
    }

    /// Run `handle` for the instance `key` as if a record with `intent` was read.
    pub fn run(&mut self, handle: Handle, key: Key, intent: Intent) -> (Result<bool>, Vec<PendingRecord>) {
        let value = self.instance(key).value().clone();
        self.run_record(handle, key, intent, value)
    }

    pub fn run_record(
        &mut self,
        handle: Handle,
        key: Key,
        intent: Intent,
        value: WorkflowInstanceRecord,
    ) -> (Result<bool>, Vec<PendingRecord>) {
        let element =
            resolve_element(&self.process, &value).expect("element should exist");
        let mut writer = RecordWriter::new(&mut self.keys);
        let result = {
            let mut ctx = BpmnStepContext {
                key,
                intent,
                value: &value,
                process: &self.process,
                element,
                state: &mut self.state,
                output: &mut writer,
            };
            handle(&mut ctx)
        };
        (result, writer.into_pending())
    }

    pub fn context_check(
        &mut self,
        check: fn(&BpmnStepContext<'_>) -> bool,
        key: Key,
        intent: Intent,
        value: WorkflowInstanceRecord,
    ) -> bool {
        let element =
            resolve_element(&self.process, &value).expect("element should exist");
        let mut writer = RecordWriter::new(&mut self.keys);
        let ctx = BpmnStepContext {
            key,
            intent,
            value: &value,
            process: &self.process,
            element,
            state: &mut self.state,
            output: &mut writer,
        };
        check(&ctx)
    }
}
