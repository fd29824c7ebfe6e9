use common::{Job, JobId, JobRequest};
use std::collections::VecDeque;

use crate::stage::PARTITION_SUFFIX_WIDTH;

/// Máximo de tareas por etapa: los ids tienen que entrar en el sufijo de
/// partición de los archivos intermedios ("part00000".."part99999").
pub const MAX_TASKS_PER_STAGE: u32 = 10u32.pow(PARTITION_SUFFIX_WIDTH as u32);

/// Cola FIFO de jobs pendientes. Los ids crecen con cada envío aceptado.
#[derive(Debug, Default)]
pub struct JobQueue {
    queue: VecDeque<Job>,
    next_job_id: JobId,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encola un job nuevo. Rechaza pedidos sin mappers o sin reducers, o con
    /// más tareas por etapa de las que admite el sufijo de partición.
    pub fn submit(&mut self, request: JobRequest) -> Result<JobId, String> {
        if request.num_mappers == 0 || request.num_reducers == 0 {
            return Err(format!(
                "num_mappers={} num_reducers={}: ambos deben ser > 0",
                request.num_mappers, request.num_reducers
            ));
        }
        if request.num_mappers > MAX_TASKS_PER_STAGE || request.num_reducers > MAX_TASKS_PER_STAGE {
            return Err(format!(
                "num_mappers={} num_reducers={}: el máximo por etapa es {}",
                request.num_mappers, request.num_reducers, MAX_TASKS_PER_STAGE
            ));
        }

        let job_id = self.next_job_id;
        self.next_job_id += 1;
        self.queue.push_back(Job::new(job_id, request));
        Ok(job_id)
    }

    pub fn pop(&mut self) -> Option<Job> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(mappers: u32, reducers: u32) -> JobRequest {
        JobRequest {
            input_directory: "in".into(),
            output_directory: "out".into(),
            mapper_executable: "map.sh".into(),
            reducer_executable: "reduce.sh".into(),
            num_mappers: mappers,
            num_reducers: reducers,
        }
    }

    #[test]
    fn jobs_come_out_in_submission_order_with_increasing_ids() {
        let mut queue = JobQueue::new();
        assert_eq!(queue.submit(request(1, 1)), Ok(0));
        assert_eq!(queue.submit(request(2, 1)), Ok(1));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop().unwrap().job_id, 0);
        assert_eq!(queue.submit(request(3, 1)), Ok(2));
        assert_eq!(queue.pop().unwrap().request.num_mappers, 2);
        assert_eq!(queue.pop().unwrap().job_id, 2);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn rejected_requests_do_not_consume_ids() {
        let mut queue = JobQueue::new();
        assert!(queue.submit(request(0, 1)).is_err());
        assert!(queue.submit(request(1, 0)).is_err());
        assert!(queue.is_empty());
        assert_eq!(queue.submit(request(1, 1)), Ok(0));
    }

    #[test]
    fn oversized_stages_are_rejected() {
        let mut queue = JobQueue::new();
        assert!(queue.submit(request(1, u32::MAX)).is_err());
        assert!(queue.submit(request(u32::MAX, 1)).is_err());
        assert!(queue.submit(request(MAX_TASKS_PER_STAGE + 1, 1)).is_err());
        assert!(queue.is_empty());

        assert_eq!(queue.submit(request(MAX_TASKS_PER_STAGE, MAX_TASKS_PER_STAGE)), Ok(0));
    }
}
