//! Fuzz target for the relay driver
//!
//! Arbitrary operation sequences are fed to the driver. After every event the
//! standard relay invariants are checked, and the driver must never report an
//! error the operation did not call for.

#![no_main]

use libfuzzer_sys::fuzz_target;
use switchboard_harness::{InvariantRegistry, ModelRelay, Operation, RelaySnapshot, SimEnv, Trigger};
use switchboard_server::{DriverConfig, ServerDriver, ServerEvent};

fuzz_target!(|ops: Vec<Operation>| {
    let mut driver = ServerDriver::new(SimEnv::with_seed(0), DriverConfig::default());
    let mut model = ModelRelay::new();
    let invariants = InvariantRegistry::standard();

    for op in ops.into_iter().take(256).map(Operation::normalized) {
        let expected_ok = model.apply(&op).is_ok();
        let event = op.to_event().expect("operation encodes");
        let trigger = match &event {
            ServerEvent::FrameReceived { connection_id, frame } => {
                Some(Trigger { sender: connection_id.clone(), frame: frame.clone() })
            },
            _ => None,
        };

        match driver.process_event(event) {
            Ok(actions) => {
                assert!(expected_ok, "driver accepted {op:?}");
                let snapshot = RelaySnapshot::capture(&driver, trigger, &actions);
                invariants.assert_all(&snapshot, &format!("after {op:?}"));
            },
            Err(e) => assert!(!expected_ok, "driver rejected {op:?}: {e}"),
        }
    }
});
