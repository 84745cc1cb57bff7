/// Running result of a catalog pass: labels in detection order plus their point total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    flags: Vec<String>,
    total: u32,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fired rule. Points accumulate without a cap.
    pub fn record(&mut self, label: &str, points: u32) {
        self.flags.push(label.to_string());
        self.total = self.total.saturating_add(points);
    }

    pub fn into_parts(self) -> (Vec<String>, u32) {
        (self.flags, self.total)
    }
}
