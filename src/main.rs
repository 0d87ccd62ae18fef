//! fli-capture binary: list cameras, show camera details, take exposures.

mod args;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use args::{Args, CaptureArgs, Command};
use fli_capture::mock::Timebase;
use fli_capture::{
    list_devices, set_debug_level, AcquisitionController, BitDepth, CameraError, CaptureConfig,
    Device, DeviceClass, DeviceSdk, Domain, ExposureConfig, FliLibrary, ImageArea, MockSdk, Result,
    TemperatureChannel,
};

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(&args) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => CaptureConfig::load(path)?,
        None => CaptureConfig::default(),
    };
    if let Some(path) = &args.library {
        config.library.path = Some(path.clone());
    }

    let sdk = open_sdk(args.simulate, &config)?;
    let sdk = sdk.as_ref();
    if let Some(level) = args.lib_debug {
        set_debug_level(sdk, None, level.into())?;
    }
    let domain = Domain::new(args.transport.into(), DeviceClass::Camera);

    match &args.command {
        Command::List => list(sdk, domain),
        Command::Info { device } => show_info(sdk, domain, device.as_deref()),
        Command::Capture(capture_args) => capture(sdk, domain, &config, capture_args),
    }
}

fn open_sdk(simulate: bool, config: &CaptureConfig) -> Result<Box<dyn DeviceSdk>> {
    if simulate {
        return Ok(Box::new(
            MockSdk::new()
                .with_timebase(Timebase::Wall)
                .with_array_area(ImageArea::new(0, 0, 1024, 1024)),
        ));
    }
    let library = match &config.library.path {
        Some(path) => FliLibrary::load_from(path)?,
        None => FliLibrary::load()?,
    };
    Ok(Box::new(library))
}

fn list(sdk: &dyn DeviceSdk, domain: Domain) -> Result<()> {
    println!("libfli: {}", sdk.lib_version()?);
    for name in list_devices(sdk, domain)? {
        println!(
            "{}\t{}",
            name.file_name,
            name.model_name.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

/// Use the requested device, or the first one enumerated.
fn resolve_device(sdk: &dyn DeviceSdk, domain: Domain, requested: Option<&str>) -> Result<String> {
    if let Some(name) = requested {
        return Ok(name.to_owned());
    }
    list_devices(sdk, domain)?
        .into_iter()
        .next()
        .map(|name| name.file_name)
        .ok_or_else(|| CameraError::InvalidArgument("no cameras found".to_owned()))
}

fn show_info(sdk: &dyn DeviceSdk, domain: Domain, requested: Option<&str>) -> Result<()> {
    let name = resolve_device(sdk, domain, requested)?;
    let device = Device::open(sdk, &name, domain)?;

    println!("Device:        {name}");
    println!("Model:         {}", device.model()?);
    println!("Serial:        {}", device.serial_string()?);
    println!(
        "Revisions:     hw {:#06x}, fw {:#06x}",
        device.hw_revision()?,
        device.fw_revision()?
    );
    let (px, py) = device.pixel_size()?;
    println!("Pixel size:    {:.2} x {:.2} um", px * 1e6, py * 1e6);
    println!("Array area:    {:?}", device.array_area()?);
    println!("Visible area:  {:?}", device.visible_area()?);
    println!("CCD temp:      {:.1} C", device.temperature()?);
    println!(
        "Base temp:     {:.1} C",
        device.read_temperature(TemperatureChannel::BASE)?
    );
    println!("Cooler power:  {:.0} %", device.cooler_power()?);
    match device.camera_modes() {
        Ok(modes) => {
            for (index, mode) in modes.iter().enumerate() {
                println!("Mode {index}:        {mode}");
            }
        }
        Err(CameraError::NotSupported(_)) => {}
        Err(err) => return Err(err),
    }
    Ok(())
}

fn capture(
    sdk: &dyn DeviceSdk,
    domain: Domain,
    config: &CaptureConfig,
    args: &CaptureArgs,
) -> Result<()> {
    let name = resolve_device(sdk, domain, args.device.as_deref())?;
    let mut device = Device::open(sdk, &name, domain)?;

    if let Some(celsius) = args.temperature {
        device.set_temperature(celsius)?;
    }
    let area = match args.area.as_deref() {
        Some(&[ul_x, ul_y, lr_x, lr_y]) => ImageArea::new(ul_x, ul_y, lr_x, lr_y),
        Some(_) => {
            return Err(CameraError::InvalidArgument(
                "--area takes four values".to_owned(),
            ))
        }
        None => device.visible_area()?.binned(args.hbin, args.vbin),
    };
    let bit_depth = if args.eight_bit {
        BitDepth::Eight
    } else {
        BitDepth::Sixteen
    };
    let exposure = ExposureConfig::new(area, Duration::from_millis(args.exposure_ms))
        .with_binning(args.hbin, args.vbin)
        .with_frame_type(args.frame_type.into())
        .with_bit_depth(bit_depth);

    let mut options = config.wait_options();
    if let Some(timeout) = args.timeout_ms {
        options.timeout = Some(Duration::from_millis(timeout));
    }

    let mut controller = AcquisitionController::new(&mut device);
    info!(exposure_ms = args.exposure_ms, "exposing");
    controller.expose(&exposure, &options)?;

    let mut output = BufWriter::new(File::create(&args.output)?);
    let written = if args.rows {
        let mut reader = controller.drain_rows()?;
        let mut row = vec![0; reader.geometry().row_bytes()];
        let mut written = 0;
        while reader.read_row_into(&mut row)?.is_some() {
            output.write_all(&row)?;
            written += row.len();
        }
        written
    } else {
        let image = controller.grab_image()?;
        output.write_all(image.as_bytes())?;
        image.as_bytes().len()
    };
    output.flush()?;
    controller.end_exposure()?;

    let geometry = controller.geometry()?;
    info!(
        path = %args.output.display(),
        bytes = written,
        width = geometry.width,
        rows = geometry.rows,
        "frame written"
    );
    Ok(())
}
