//! Extract motion fields into a easy-to-read file.

use anyhow::{anyhow, Result};
use clap::*;
use log::*;
use mpegflow::prelude::v1::{Marker, MotionField, MvecWriter, ReaderConfig, GRID_STEP};
use std::fs::File;
use std::io::BufWriter;

fn input_arg() -> Arg<'static> {
    Arg::new("input").takes_value(true).required(true)
}

fn main() -> Result<()> {
    env_logger::init();

    let matches = Command::new("motion-extract")
        .version(crate_version!())
        .author(crate_authors!())
        .subcommand_required(true)
        .subcommand(
            Command::new("extract")
                .about("Dump motion fields into a .mvec file")
                .arg(input_arg())
                .arg(Arg::new("output").long("output").short('o').takes_value(true))
                .arg(
                    Arg::new("grid-step")
                        .long("grid-step")
                        .short('g')
                        .takes_value(true),
                )
                .arg(Arg::new("dump-format").long("dump-format").short('d')),
        )
        .subcommand(
            Command::new("length")
                .about("Print video length in seconds")
                .arg(input_arg()),
        )
        .subcommand(
            Command::new("check")
                .about("Check whether the video opens")
                .arg(input_arg()),
        )
        .subcommand(
            Command::new("window")
                .about("Print frame times of a time window")
                .arg(input_arg())
                .arg(
                    Arg::new("start")
                        .long("start")
                        .short('s')
                        .takes_value(true)
                        .required(true),
                )
                .arg(Arg::new("end").long("end").short('e').takes_value(true)),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("extract", m)) => {
            let input = m.value_of("input").unwrap();
            let grid_step = m
                .value_of("grid-step")
                .map(str::parse::<usize>)
                .transpose()?
                .unwrap_or(GRID_STEP);

            // Output file always ends with `.mvec`.
            let output = m.value_of("output").unwrap_or(input);
            let output = format!("{output}.mvec");

            extract(input, &output, grid_step, m.is_present("dump-format"))
        }
        Some(("length", m)) => {
            let length = av_decoder::get_video_length(m.value_of("input").unwrap())?;
            println!("{length}");
            Ok(())
        }
        Some(("check", m)) => {
            let status = av_decoder::open_file(m.value_of("input").unwrap());
            println!("{status}");
            std::process::exit(status);
        }
        Some(("window", m)) => {
            let start: f64 = m.value_of("start").unwrap().parse()?;
            let end: Option<f64> = m.value_of("end").map(str::parse::<f64>).transpose()?;

            let descriptors = av_decoder::run(
                m.value_of("input").unwrap(),
                Default::default(),
                start,
                end,
                &mut |_: &MotionField, time: f64, out: &mut Vec<f64>| out.push(time),
            )?;

            // Frame times are never negative, so only the trailing values can be markers.
            for d in descriptors {
                match Marker::from_value(d) {
                    Some(marker) => println!("{d} ({marker:?})"),
                    None => println!("{d}"),
                }
            }

            Ok(())
        }
        _ => Err(anyhow!("Unknown subcommand")),
    }
}

fn extract(input: &str, output: &str, grid_step: usize, dump_format: bool) -> Result<()> {
    let config = ReaderConfig::new().grid_step(grid_step);
    let mut reader = av_decoder::open(input, config)?;

    if let Some(source) = reader.source_mut().filter(|_| dump_format) {
        source.dump_format();
    }

    if reader.frame_count_is_estimated() {
        warn!("Frame count is estimated from the stream duration");
    }

    let mut out = MvecWriter::new(BufWriter::new(File::create(output)?), grid_step)?;
    let mut written = 0usize;

    for field in &mut reader {
        out.write_field(&field?)?;
        written += 1;
    }

    out.flush()?;

    info!("Wrote {written} motion fields to {output}");

    Ok(())
}
