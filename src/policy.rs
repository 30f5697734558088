// VHOSTPIN PIN-MODE POLICY RESOLVER
// PURE: (CURRENT Cpus_allowed_list, PIN MODE) -> (DESIRED LIST, NEEDS APPLY)
//
// first / last WORK ON THE TEXT OF THE CURRENT LIST: THE LEADING INTEGER IS
// THE LOWEST CPU, THE TRAILING INTEGER IS THE HIGHEST. A THREAD ALREADY ON A
// SINGLE CPU IS LEFT ALONE. AN EXPLICIT LIST IS ALWAYS REAPPLIED.

use std::fmt;

use regex::Regex;

use crate::error::PinError;

const CPU_LIST_PATTERN: &str = r"^[0-9]+(-[0-9]+)?(,[0-9]+(-[0-9]+)?)*$";
const SINGLE_CPU_PATTERN: &str = r"^[0-9]+$";
const FIRST_CPU_PATTERN: &str = r"^([0-9]+)[^0-9]";
const LAST_CPU_PATTERN: &str = r"[^0-9]([0-9]+)$";

pub const MODE_FIRST: &str = "first";
pub const MODE_LAST: &str = "last";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PinPolicy {
    First,
    Last,
    Explicit(String),
}

impl fmt::Display for PinPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => f.write_str(MODE_FIRST),
            Self::Last => f.write_str(MODE_LAST),
            Self::Explicit(list) => f.write_str(list),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub cpus: String,
    pub needs_apply: bool,
}

impl Decision {
    fn apply(cpus: &str) -> Self {
        Self { cpus: cpus.to_string(), needs_apply: true }
    }

    fn keep(cpus: &str) -> Self {
        Self { cpus: cpus.to_string(), needs_apply: false }
    }
}

// COMPILED ONCE PER PINNER. Regex IS Sync, SO ONE RESOLVER SERVES EVERY
// DISPATCH THREAD WITHOUT LOCKING.
#[derive(Clone, Debug)]
pub struct Resolver {
    cpu_list: Regex,
    single_cpu: Regex,
    first_cpu: Regex,
    last_cpu: Regex,
}

impl Resolver {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            cpu_list: Regex::new(CPU_LIST_PATTERN)?,
            single_cpu: Regex::new(SINGLE_CPU_PATTERN)?,
            first_cpu: Regex::new(FIRST_CPU_PATTERN)?,
            last_cpu: Regex::new(LAST_CPU_PATTERN)?,
        })
    }

    pub fn is_cpu_list(&self, s: &str) -> bool {
        self.cpu_list.is_match(s)
    }

    // ACCEPTS EXACTLY "first", "last" OR A CPU LIST
    pub fn parse_policy(&self, mode: &str) -> Result<PinPolicy, PinError> {
        match mode {
            MODE_FIRST => Ok(PinPolicy::First),
            MODE_LAST => Ok(PinPolicy::Last),
            _ if self.is_cpu_list(mode) => Ok(PinPolicy::Explicit(mode.to_string())),
            _ => Err(PinError::InvalidPolicy(mode.to_string())),
        }
    }

    pub fn resolve(&self, current: &str, policy: &PinPolicy) -> Result<Decision, PinError> {
        match policy {
            PinPolicy::Explicit(list) => {
                // TODO: SKIP WHEN current ALREADY EQUALS THE CANONICAL FORM OF list
                if !self.is_cpu_list(list) {
                    return Err(PinError::InvalidPolicy(list.clone()));
                }
                Ok(Decision::apply(list))
            }
            PinPolicy::First => self.pick(current, &self.first_cpu, MODE_FIRST),
            PinPolicy::Last => self.pick(current, &self.last_cpu, MODE_LAST),
        }
    }

    fn pick(&self, current: &str, pattern: &Regex, mode: &str) -> Result<Decision, PinError> {
        if self.single_cpu.is_match(current) {
            return Ok(Decision::keep(current));
        }
        match pattern.captures(current).and_then(|c| c.get(1)) {
            Some(cpu) => Ok(Decision::apply(cpu.as_str())),
            None => Err(PinError::parse(
                current,
                format!("pin-mode '{}' found no cpu in cpus_allowed_list", mode),
            )),
        }
    }

    // TOKEN-LEVEL ENTRY: UNKNOWN MODES SURFACE AS InvalidPolicy
    pub fn resolve_mode(&self, current: &str, mode: &str) -> Result<Decision, PinError> {
        let policy = self.parse_policy(mode)?;
        self.resolve(current, &policy)
    }
}
