//! `get` subcommand — read one or all parameters from a device.

use nanokicker_lib::kicker::Kicker;
use nanokicker_lib::link::{Link, LinkError};

use super::{
    DeviceOutput, KickerError, Parameter, ParameterOutput, Parameters, ReadReport, Result, Slot,
    format_param, kv, kv_width, open_board, print_json, print_params,
};

pub(super) fn param_json(params: &Parameters, param: Parameter) -> serde_json::Value {
    use serde_json::json;
    match param {
        Parameter::Mode => json!(params.mode),
        Parameter::Frequency => json!(params.frequency),
        Parameter::Amplitude => json!(params.amplitude),
        Parameter::StartupEnabled => json!(params.startup_enabled),
        Parameter::Vin => json!(params.vin),
        Parameter::Vout => json!(params.vout),
        Parameter::PotRange => json!(params.pot_range),
        Parameter::RgTrim => json!(params.r_g_trim),
        Parameter::RfTrim => json!(params.r_f_trim),
        Parameter::Wiper => json!(params.wiper),
    }
}

/// Read every parameter. A lost link is an error; other gaps are reported.
pub(super) fn read_all(kicker: &mut Kicker, link: &mut Link) -> Result<ReadReport> {
    let report = kicker.read_all_parameters(link);
    if let Some((_, e)) = report
        .failed
        .iter()
        .find(|(_, e)| matches!(e, LinkError::LinkLost(_)))
    {
        return Err(KickerError::Link(e.clone()));
    }
    Ok(report)
}

fn read_one(kicker: &mut Kicker, link: &mut Link, param: Parameter) -> Result<Option<String>> {
    let got = kicker.read_parameter(link, param)?;
    Ok(got.then(|| format_param(kicker.params(), param)))
}

/// Print a device block the way `get`, `set` and `load` share it.
pub(super) fn print_device(slot: Slot, params: &Parameters, report: Option<&ReadReport>) {
    println!("NanoKicker #{slot}");
    print_params(params);
    if let Some(r) = report
        && !r.is_complete()
    {
        println!();
        println!(
            "  ({} of {} parameters read, {} without reply, {} failed)",
            r.read,
            Parameter::READ_ORDER.len(),
            r.empty,
            r.failed.len()
        );
    }
}

pub(super) fn cmd_get(opts: &super::Options, slot: Slot, param: Option<Parameter>) -> Result<()> {
    let (mut board, _config) = open_board(opts)?;
    let (kicker, link) = board.attach(slot);

    if let Some(param) = param {
        let value = read_one(kicker, link, param)?;
        if opts.json {
            return print_json(&ParameterOutput {
                slot,
                parameter: param.to_string(),
                value: if value.is_some() {
                    param_json(kicker.params(), param)
                } else {
                    serde_json::Value::Null
                },
            });
        }
        let key = format!("{param}:");
        let w = kv_width(&[key.as_str()], &[]);
        kv(&key, value.as_deref().unwrap_or("(no reply)"), w);
        return Ok(());
    }

    let report = read_all(kicker, link)?;
    if opts.json {
        return print_json(&DeviceOutput {
            slot,
            parameters: kicker.params().clone(),
            read: (&report).into(),
        });
    }
    print_device(slot, kicker.params(), Some(&report));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::mock_board;
    use super::*;
    use nanokicker_lib::protocol::Mode;
    use nanokicker_lib::transport::mock::Reply;

    fn slot(id: u8) -> Slot {
        Slot::new(id).unwrap()
    }

    #[test]
    fn read_one_formats_value() {
        let (mut board, conn) = mock_board();
        conn.push_value(1500);
        let (kicker, link) = board.attach(slot(2));
        let value = read_one(kicker, link, Parameter::Frequency).unwrap();
        assert_eq!(value.as_deref(), Some("1500 Hz"));
        assert_eq!(conn.frames(), vec![vec![2, 22, 0, 0, 0, 0]]);
    }

    #[test]
    fn read_one_without_reply_is_none() {
        let (mut board, _conn) = mock_board();
        let (kicker, link) = board.attach(slot(2));
        assert_eq!(read_one(kicker, link, Parameter::Vin).unwrap(), None);
    }

    #[test]
    fn read_all_fails_on_link_loss() {
        let (mut board, conn) = mock_board();
        conn.push_reply(Reply::Drop);
        let (kicker, link) = board.attach(slot(0));
        let err = read_all(kicker, link).unwrap_err();
        assert!(matches!(err, KickerError::Link(LinkError::LinkLost(_))));
    }

    #[test]
    fn read_all_tolerates_missing_values() {
        let (mut board, conn) = mock_board();
        conn.push_value(2);
        let (kicker, link) = board.attach(slot(0));
        let report = read_all(kicker, link).unwrap();
        assert_eq!(report.read, 1);
        assert_eq!(report.empty, 9);
        assert_eq!(kicker.params().mode, Some(Mode::Square));
    }

    #[test]
    fn param_json_types() {
        let p = Parameters {
            mode: Some(Mode::Triangle),
            amplitude: Some(0.5),
            startup_enabled: Some(true),
            ..Parameters::default()
        };
        assert_eq!(param_json(&p, Parameter::Mode), "triangle");
        assert_eq!(param_json(&p, Parameter::Amplitude), 0.5);
        assert_eq!(param_json(&p, Parameter::StartupEnabled), true);
        assert!(param_json(&p, Parameter::Wiper).is_null());
    }
}
