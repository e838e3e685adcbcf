use crate::il::CallString;

/// Options that change the behavior of `fixed_point_forward`.
///
/// Options are immutable once built. Create them with
/// `AnalysisOptionsBuilder`, or use `AnalysisOptions::default()`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AnalysisOptions {
    widening_delay: usize,
    max_iterations: usize,
    call_string_length: usize,
    context: CallString,
}

impl AnalysisOptions {
    pub fn new() -> AnalysisOptions {
        AnalysisOptions::default()
    }

    /// How many times a loop head is visited with plain joins before the
    /// driver starts to widen there.
    pub fn widening_delay(&self) -> usize {
        self.widening_delay
    }

    /// The number of vertex visits after which the analysis gives up with
    /// `Error::FixedPointMaxIterations`.
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// The number of call sites kept in a calling context.
    pub fn call_string_length(&self) -> usize {
        self.call_string_length
    }

    /// The calling context the analyzed automaton runs in.
    pub fn context(&self) -> &CallString {
        &self.context
    }
}

impl Default for AnalysisOptions {
    fn default() -> AnalysisOptions {
        AnalysisOptions {
            widening_delay: 3,
            max_iterations: 10_000,
            call_string_length: 1,
            context: CallString::new(),
        }
    }
}

/// Builds `AnalysisOptions`.
#[derive(Clone, Debug, Default)]
pub struct AnalysisOptionsBuilder {
    options: AnalysisOptions,
}

impl AnalysisOptionsBuilder {
    pub fn new() -> AnalysisOptionsBuilder {
        AnalysisOptionsBuilder::default()
    }

    pub fn widening_delay(mut self, widening_delay: usize) -> AnalysisOptionsBuilder {
        self.options.widening_delay = widening_delay;
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> AnalysisOptionsBuilder {
        self.options.max_iterations = max_iterations;
        self
    }

    /// Set the call-string length. The current context is truncated to it.
    pub fn call_string_length(mut self, call_string_length: usize) -> AnalysisOptionsBuilder {
        self.options.call_string_length = call_string_length;
        let mut context = CallString::new();
        for site in self.options.context.sites() {
            context = context.push(*site, call_string_length);
        }
        self.options.context = context;
        self
    }

    /// Analyze in the context of a call from `site`, on top of the current
    /// context.
    pub fn called_from(mut self, site: usize) -> AnalysisOptionsBuilder {
        self.options.context = self
            .options
            .context
            .push(site, self.options.call_string_length);
        self
    }

    pub fn build(self) -> AnalysisOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = AnalysisOptions::default();
        assert_eq!(options.widening_delay(), 3);
        assert_eq!(options.max_iterations(), 10_000);
        assert_eq!(options.call_string_length(), 1);
        assert!(options.context().is_empty());
        assert_eq!(AnalysisOptionsBuilder::new().build(), options);
    }

    #[test]
    fn builder() {
        let options = AnalysisOptionsBuilder::new()
            .widening_delay(0)
            .max_iterations(50)
            .call_string_length(2)
            .called_from(4)
            .called_from(9)
            .called_from(12)
            .build();
        assert_eq!(options.widening_delay(), 0);
        assert_eq!(options.max_iterations(), 50);
        assert_eq!(options.context().sites(), &[9, 12]);
    }

    #[test]
    fn shorter_call_strings_truncate_the_context() {
        let options = AnalysisOptionsBuilder::new()
            .call_string_length(3)
            .called_from(1)
            .called_from(2)
            .call_string_length(1)
            .build();
        assert_eq!(options.context().sites(), &[2]);
    }
}
