//! Field grammars of the subsystems known to this crate.

use crate::error::TraceError;
use crate::grammar::FieldGrammar;
use crate::grammar::field_grammar;

field_grammar!(
    #[subsystem("thermal")]
    #[marker("thermal_power_allocator:")]
    pub static THERMAL {
        Pgpu_in: Int,
        Pa7_in: Int,
        Pa15_in: Int,
        Pgpu_out: Int,
        Pa7_out: Int,
        Pa15_out: Int,
        Ptot_in: Int,
        Ptot_out: Int,
        Pdelta: Int,
        err_integral: Int,
        currT: Int,
        output: Int,
    }
);

field_grammar!(
    #[subsystem("thermal_zone")]
    #[marker("thermal_temperature:")]
    pub static THERMAL_ZONE {
        zone_id: Int = "id",
        temp_prev: Int,
        temp: Int,
    }
);

field_grammar!(
    #[subsystem("pid")]
    #[marker("thermal_power_allocator_pid:")]
    pub static PID {
        err: Int,
        err_integral: Int,
        p: Int,
        i: Int,
        d: Int,
        output: Int,
    }
);

/// Every registered grammar.
pub static ALL: &[&FieldGrammar] = &[&THERMAL, &THERMAL_ZONE, &PID];

/// Look up a grammar by subsystem name.
pub fn by_name(name: &str) -> Result<&'static FieldGrammar, TraceError> {
    ALL.iter()
        .copied()
        .find(|grammar| grammar.subsystem == name)
        .ok_or_else(|| TraceError::UnknownSubsystem(name.into()))
}
