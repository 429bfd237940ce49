use scheduling::SchedulingContext;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) scheduling: SchedulingContext,
    pub(crate) max_body_bytes: usize,
}
