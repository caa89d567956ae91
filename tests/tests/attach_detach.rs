use flowcheck::verify_attach_detach;
use flowcheck_tests::framework::*;

#[test]
fn attach_detach() -> anyhow::Result<()> {
    let (session, _switch, mut ran, subscribers, _logger) = init()?;

    // Full checkpoint run: baseline, attach, uplink/downlink rule checks,
    // detach, baseline again.
    let imsi = subscribers[0].clone();
    ran.configure_ue(1, imsi.clone());
    verify_attach_detach(&session, &mut ran, 1, &imsi)?;
    Ok(())
}

#[test]
fn two_subscribers_in_sequence() -> anyhow::Result<()> {
    let (session, _switch, mut ran, subscribers, _logger) = init()?;

    // The table must return to baseline between cycles, so a second
    // subscriber's cycle passes the same checkpoints.
    for (ue_id, imsi) in [(1u32, &subscribers[0]), (2, &subscribers[1])] {
        ran.configure_ue(ue_id, imsi.clone());
        verify_attach_detach(&session, &mut ran, ue_id, imsi)?;
    }
    Ok(())
}
