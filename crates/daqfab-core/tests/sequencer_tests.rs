//! End-to-end sequencer tests against the loopback carrier.
//!
//! These exercise the full verify-then-capture cycle without hardware:
//! burst accounting, artifact layout, and the abort paths for transport
//! faults and failed link verification.

use daqfab_core::prelude::*;
use daqfab_fabric::profile_for;

fn single_card_session() -> CardSession {
    let topology = FabricTopology::standard();
    let profile = profile_for(0x0041).expect("compact carrier profile");
    CardSession::new(0, &topology, profile).expect("session for slot 0")
}

#[test]
fn clean_session_uses_exactly_four_burst_reads() {
    let dir = tempfile::tempdir().unwrap();
    let mut transport = LoopbackTransport::new();
    let mut sequencer =
        AcquisitionSequencer::new(single_card_session(), SequencerConfig::with_dir(dir.path()));

    let report = sequencer.run(&mut transport).unwrap();

    assert_eq!(sequencer.state(), SessionState::Done);
    assert_eq!(report.verify_reads, 2);
    assert_eq!(report.capture_reads, 2);
    assert_eq!(transport.burst_reads(), 4, "never more than four reads");
    assert_eq!(transport.burst_writes(), 2, "one upload per playback channel");
}

#[test]
fn artifacts_cover_both_dacs_and_both_adcs() {
    let dir = tempfile::tempdir().unwrap();
    let mut transport = LoopbackTransport::new();
    let mut sequencer =
        AcquisitionSequencer::new(single_card_session(), SequencerConfig::with_dir(dir.path()));

    let report = sequencer.run(&mut transport).unwrap();

    let names: Vec<String> = report
        .artifacts
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    for expected in [
        "dac0.txt", "dac0.bin", "dac1.txt", "dac1.bin",
        "adc0.txt", "adc0.bin", "adc1.txt", "adc1.bin",
    ] {
        assert!(names.contains(&expected.to_string()), "missing {expected}");
        assert!(dir.path().join(expected).exists(), "{expected} not on disk");
    }
}

#[test]
fn captures_loop_back_the_playback_waveforms() {
    let dir = tempfile::tempdir().unwrap();
    let mut transport = LoopbackTransport::new();
    let mut sequencer =
        AcquisitionSequencer::new(single_card_session(), SequencerConfig::with_dir(dir.path()));
    sequencer.run(&mut transport).unwrap();

    // The loopback carrier feeds each capture input from the matching
    // playback memory, so adcN.bin must equal dacN.bin byte for byte.
    for channel in 0..2 {
        let dac = std::fs::read(dir.path().join(format!("dac{channel}.bin"))).unwrap();
        let adc = std::fs::read(dir.path().join(format!("adc{channel}.bin"))).unwrap();
        assert_eq!(dac, adc, "channel {channel}");
    }
}

#[test]
fn transport_fault_on_first_verify_read_fails_without_second_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let mut transport = LoopbackTransport::new().fail_read_burst_at(1);
    let mut sequencer =
        AcquisitionSequencer::new(single_card_session(), SequencerConfig::with_dir(dir.path()));

    let err = sequencer.run(&mut transport).unwrap_err();

    assert!(matches!(err, DaqError::Transport { .. }));
    assert_eq!(sequencer.state(), SessionState::Failed);
    assert_eq!(transport.burst_reads(), 0, "no read completed");
    // No capture artifact may exist — only the playback waveforms were archived.
    assert!(!dir.path().join("adc0.txt").exists());
    assert!(!dir.path().join("adc1.txt").exists());
    assert!(dir.path().join("dac0.txt").exists());
}

#[test]
fn ramp_glitch_still_checks_second_input_then_fails() {
    let dir = tempfile::tempdir().unwrap();
    // Glitch only the first patterned read; the second input serves clean.
    let mut transport = LoopbackTransport::new().glitch_next_ramp_at(10);
    let mut sequencer =
        AcquisitionSequencer::new(single_card_session(), SequencerConfig::with_dir(dir.path()));

    let err = sequencer.run(&mut transport).unwrap_err();

    let DaqError::VerificationFailed { mismatches } = err else {
        panic!("expected verification failure, got {err}");
    };
    assert_eq!(mismatches, 1024 - 10);
    assert_eq!(sequencer.state(), SessionState::Failed);
    // Both inputs were still read before giving up.
    assert_eq!(transport.burst_reads(), 2);
    // Verification failure gates the captures: nothing was archived.
    assert!(!dir.path().join("adc0.bin").exists());
}

#[test]
fn upload_fault_aborts_before_any_capture() {
    let dir = tempfile::tempdir().unwrap();
    let mut transport = LoopbackTransport::new().fail_write_burst_at(1);
    let mut sequencer =
        AcquisitionSequencer::new(single_card_session(), SequencerConfig::with_dir(dir.path()));

    let err = sequencer.run(&mut transport).unwrap_err();
    assert!(matches!(err, DaqError::Transport { .. }));
    assert_eq!(transport.burst_reads(), 0);
}

#[test]
fn routing_fault_fails_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let topology = FabricTopology::standard();
    let mut transport = LoopbackTransport::new().fail_write_reg(topology.capture_router_base);
    let mut sequencer =
        AcquisitionSequencer::new(single_card_session(), SequencerConfig::with_dir(dir.path()));

    let err = sequencer.run(&mut transport).unwrap_err();
    assert!(matches!(err, DaqError::Transport { .. }));
    assert_eq!(sequencer.state(), SessionState::Failed);
}

#[test]
fn dual_slot_run_suffixes_artifacts_per_card() {
    let dir = tempfile::tempdir().unwrap();
    let topology = FabricTopology::standard();
    let profile = profile_for(0x0091).expect("dual-slot profile");
    let sessions = sessions_for(&topology, profile).unwrap();

    let mut transport = LoopbackTransport::new();
    let outcomes = run_sessions(
        &mut transport,
        sessions,
        &SequencerConfig::with_dir(dir.path()),
    );

    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        assert!(outcome.result.is_ok(), "card {} failed", outcome.card);
    }
    for name in [
        "dac0_primary.bin",
        "adc1_primary.txt",
        "dac1_secondary.txt",
        "adc0_secondary.bin",
    ] {
        assert!(dir.path().join(name).exists(), "missing {name}");
    }
}

#[test]
fn one_failed_card_does_not_cancel_the_next() {
    let dir = tempfile::tempdir().unwrap();
    let topology = FabricTopology::standard();
    let profile = profile_for(0x0091).expect("dual-slot profile");
    let sessions = sessions_for(&topology, profile).unwrap();

    // First verify read of card 0 fails; card 1 still runs to Done.
    let mut transport = LoopbackTransport::new().fail_read_burst_at(1);
    let outcomes = run_sessions(
        &mut transport,
        sessions,
        &SequencerConfig::with_dir(dir.path()),
    );

    assert!(outcomes[0].result.is_err());
    assert!(outcomes[1].result.is_ok());
    assert!(dir.path().join("adc0_secondary.bin").exists());
    assert!(!dir.path().join("adc0_primary.bin").exists());
}
