//! A small inspection tool for AMF payloads and packets, grounded on the
//! teacher's `lso-to-json` binary: read a file, decode it with an anonymous
//! codec (no registered data contracts), and print the result as
//! pretty-printed JSON. Can also run the reverse, turning a JSON file back
//! into bytes, for round-trip inspection of fixtures.

use std::fs;
use std::io::Write;
use std::process;

use amf_codec::{AmfVersion, Codec, Options};
use clap::{App, Arg, SubCommand};

fn build_cli() -> App<'static, 'static> {
    App::new("amf-cli")
        .version("0.1.0")
        .about("Decode/encode AMF0/AMF3 payloads and packets for manual inspection")
        .subcommand(
            SubCommand::with_name("decode")
                .about("Decode a binary AMF payload or packet to JSON")
                .arg(Arg::with_name("input").required(true).help("Path to the binary payload"))
                .arg(
                    Arg::with_name("version")
                        .long("version")
                        .takes_value(true)
                        .possible_values(&["0", "3"])
                        .default_value("3")
                        .help("AMF version of a single payload (ignored for --packet)"),
                )
                .arg(
                    Arg::with_name("packet")
                        .long("packet")
                        .help("Treat the input as a full packet envelope (§4.F) rather than a single value"),
                ),
        )
        .subcommand(
            SubCommand::with_name("encode")
                .about("Encode a JSON value back into a binary AMF payload")
                .arg(Arg::with_name("input").required(true).help("Path to a JSON file"))
                .arg(Arg::with_name("output").required(true).help("Path to write the encoded bytes"))
                .arg(
                    Arg::with_name("version")
                        .long("version")
                        .takes_value(true)
                        .possible_values(&["0", "3"])
                        .default_value("3"),
                ),
        )
}

fn parse_version(raw: &str) -> AmfVersion {
    match raw {
        "0" => AmfVersion::Amf0,
        _ => AmfVersion::Amf3,
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        ("decode", Some(sub)) => {
            let input = sub.value_of("input").expect("required");
            let version = parse_version(sub.value_of("version").unwrap_or("3"));
            let bytes = fs::read(input)?;
            let codec = Codec::anonymous(Options {
                version,
                allow_version_switch: true,
            });

            if sub.is_present("packet") {
                let packet = codec.decode_packet(&bytes)?;
                let json = serde_json::to_string_pretty(&packet_to_json(&packet))?;
                println!("{}", json);
            } else {
                let value = codec.decode_value(&bytes)?;
                let json = serde_json::to_string_pretty(&value)?;
                println!("{}", json);
            }
            Ok(())
        }
        ("encode", Some(sub)) => {
            let input = sub.value_of("input").expect("required");
            let output = sub.value_of("output").expect("required");
            let version = parse_version(sub.value_of("version").unwrap_or("3"));
            let text = fs::read_to_string(input)?;
            let value: amf_codec::Value = serde_json::from_str(&text)?;
            let codec = Codec::anonymous(Options {
                version,
                allow_version_switch: true,
            });
            let bytes = codec.encode_value(&value, Vec::new())?;
            let mut file = fs::File::create(output)?;
            file.write_all(&bytes)?;
            Ok(())
        }
        _ => {
            build_cli().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// `Packet` doesn't derive `Serialize` (its `Value` fields already do, under
/// the `serde` feature, but headers/messages carry plain fields too) — this
/// builds the same JSON shape `serde_json::Value::Object` would produce.
fn packet_to_json(packet: &amf_codec::Packet) -> serde_json::Value {
    use serde_json::json;
    json!({
        "version": match packet.version {
            AmfVersion::Amf0 => 0,
            AmfVersion::Amf3 => 3,
        },
        "headers": packet.headers.iter().map(|h| json!({
            "name": h.name,
            "mustUnderstand": h.must_understand,
            "value": h.value,
        })).collect::<Vec<_>>(),
        "messages": packet.messages.iter().map(|m| json!({
            "targetUri": m.target_uri,
            "responseUri": m.response_uri,
            "value": m.value,
        })).collect::<Vec<_>>(),
    })
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}
