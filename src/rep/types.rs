#[derive(Debug, Clone)]
pub enum RepCommand {
    SetRunning(bool),
}

#[derive(Debug, Clone)]
pub enum RepEvent {
    Count(u32),
}
