use super::event::{InstanceId, Kind, PipelineId, StatusEvent};

/// Latest event of a single instance
#[derive(Debug, Clone)]
pub struct InstanceStatus {
    pub instance: InstanceId,
    pub event: StatusEvent,
}

/// Per-instance statuses grouped by role, each group sorted by component id
#[derive(Debug, Clone, Default)]
pub struct RoleBreakdown {
    pub receivers: Vec<InstanceStatus>,
    pub processors: Vec<InstanceStatus>,
    pub exporters: Vec<InstanceStatus>,
}

impl RoleBreakdown {
    pub fn from_instances<I>(instances: I) -> Self
    where
        I: IntoIterator<Item = InstanceStatus>,
    {
        let mut breakdown = Self::default();
        for status in instances {
            match status.instance.kind() {
                Kind::Receiver => breakdown.receivers.push(status),
                Kind::Processor => breakdown.processors.push(status),
                Kind::Exporter => breakdown.exporters.push(status),
            }
        }
        for group in [
            &mut breakdown.receivers,
            &mut breakdown.processors,
            &mut breakdown.exporters,
        ] {
            group.sort_by(|a, b| a.instance.component().cmp(b.instance.component()));
        }
        breakdown
    }

    pub fn len(&self) -> usize {
        self.receivers.len() + self.processors.len() + self.exporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Aggregate and breakdown for one pipeline
#[derive(Debug, Clone)]
pub struct PipelineStatusDetails {
    pub pipeline: PipelineId,
    pub aggregate: StatusEvent,
    pub components: RoleBreakdown,
}

/// System aggregate, every instance, and every known pipeline (sorted by name)
#[derive(Debug, Clone)]
pub struct CollectorStatusDetails {
    pub aggregate: StatusEvent,
    pub components: RoleBreakdown,
    pub pipelines: Vec<PipelineStatusDetails>,
}

impl CollectorStatusDetails {
    pub fn pipeline(&self, pipeline: &str) -> Option<&PipelineStatusDetails> {
        self.pipelines.iter().find(|p| p.pipeline.as_str() == pipeline)
    }
}
