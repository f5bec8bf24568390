/// Options that change how a control-flow graph is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(deny_unknown_fields, rename_all = "kebab-case", default)
)]
pub struct CfgSettings {
    /// Run the simplification phase after assembling blocks.
    pub simplify: bool,
    /// Treat every invocation as possibly raising `java.lang.Throwable`, in
    /// addition to the exceptions it declares.
    pub unchecked_call_exceptions: bool,
    /// Route `return`, `break` and `continue` through every `finally` block
    /// they leave. When disabled, such jumps go straight to their target.
    pub finally_on_abrupt_exit: bool,
}

impl Default for CfgSettings {
    fn default() -> Self {
        Self {
            simplify: true,
            unchecked_call_exceptions: true,
            finally_on_abrupt_exit: true,
        }
    }
}
