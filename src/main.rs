use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    time::Duration,
};

use abootimg::{
    config, device, logging, BootImage, ContainerReader, Header, SectionKind, Sink,
};
use clap::{Parser, Subcommand};
use console::{style, Emoji};
use indicatif::{ProgressBar, ProgressStyle};

mod args;
use args::*;

#[derive(Parser)]
#[command(about, version)]
pub struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the header of a boot image
    Info {
        /// Path to the boot image or block device
        image: PathBuf,
    },
    /// Extract the config and sections of a boot image
    Extract {
        /// Path to the boot image or block device
        image:   PathBuf,
        /// Config output [default: bootimg.cfg]
        config:  Option<PathBuf>,
        /// Kernel output [default: zImage]
        kernel:  Option<PathBuf>,
        /// Ramdisk output [default: initrd.img]
        ramdisk: Option<PathBuf>,
        /// Second stage output [default: stage2.img]
        second:  Option<PathBuf>,
        /// Device tree output [default: dt.img]
        devtree: Option<PathBuf>,
    },
    /// Update a boot image in place
    Update {
        /// Path to the boot image or block device
        image: PathBuf,
        #[command(flatten)]
        edits: EditArgs,
    },
    /// Create a new boot image
    Create {
        /// Path to the new boot image or a block device
        image: PathBuf,
        #[command(flatten)]
        edits: EditArgs,
    },
}

#[derive(clap::Args)]
struct EditArgs {
    /// Header entry as key=value, may be repeated
    #[arg(short = 'c', value_name = "KEY=VALUE")]
    entries: Vec<String>,
    /// Config file with one key=value entry per line
    #[arg(short = 'f', value_name = "FILE")]
    config:  Option<PathBuf>,
    /// Kernel image
    #[arg(short = 'k', value_name = "FILE")]
    kernel:  Option<PathBuf>,
    /// Ramdisk image
    #[arg(short = 'r', value_name = "FILE")]
    ramdisk: Option<PathBuf>,
    /// Second stage image
    #[arg(short = 's', value_name = "FILE")]
    second:  Option<PathBuf>,
    /// Device tree image
    #[arg(short = 't', value_name = "FILE")]
    devtree: Option<PathBuf>,
}

impl EditArgs {
    fn sources(&self) -> [Option<&Path>; 4] {
        [
            self.kernel.as_deref(),
            self.ramdisk.as_deref(),
            self.second.as_deref(),
            self.devtree.as_deref(),
        ]
    }
}

fn main() {
    color_backtrace::install();
    logging::init();

    let args = Args::parse();

    match args.command {
        Command::Info { image } => info(&image),
        Command::Extract {
            image,
            config,
            kernel,
            ramdisk,
            second,
            devtree,
        } => extract(&image, config.as_deref(), [
            kernel.as_deref(),
            ramdisk.as_deref(),
            second.as_deref(),
            devtree.as_deref(),
        ]),
        Command::Update { image, edits } => update(&image, &edits),
        Command::Create { image, edits } => create(&image, &edits),
    }
}

fn open_image(path: &Path) -> (BootImage, ContainerReader<File>) {
    let mut file = File::open(path).unwrap_or_else(|e| fail(&format!("couldn't open {}", path.display()), e));
    let target = device::query(&mut file).unwrap_or_else(|e| fail("couldn't get image size", e));
    let mut container = ContainerReader::new(file, target);
    let image = BootImage::read_from(&mut container).unwrap_or_else(|e| fail("invalid boot image", e));
    (image, container)
}

fn info(image_path: &Path) {
    let path = get_existing_image_path(image_path);
    let (image, _) = open_image(&path);
    print_info(&path, &image);
}

fn megabytes(size: impl Into<u64>) -> f64 { size.into() as f64 / 0x100000 as f64 }

fn print_info(path: &Path, image: &BootImage) {
    let header: &Header = &image.header;
    let size = image.size().unwrap_or(0);

    println!("\n{}\n", style("Android Boot Image Info:").bold());
    println!(
        "* file name = {} {}\n",
        style(path.display()).blue(),
        if image.is_block_device() {
            style("[block device]").bold().dim()
        } else {
            style("")
        }
    );

    println!("* image size = {} bytes ({:.2} MB)", size, megabytes(size));
    println!("  page size  = {} bytes\n", header.page_size);
    println!("* Boot Name = \"{}\"\n", header.name());

    println!(
        "* kernel size       = {} bytes ({:.2} MB)",
        header.kernel_size(),
        megabytes(header.kernel_size())
    );
    println!(
        "  ramdisk size      = {} bytes ({:.2} MB)",
        header.ramdisk_size(),
        megabytes(header.ramdisk_size())
    );
    if header.second_size() != 0 {
        println!(
            "  second stage size = {} bytes ({:.2} MB)",
            header.second_size(),
            megabytes(header.second_size())
        );
    }
    if header.dt_size() != 0 {
        println!(
            "  device tree size  = {} bytes ({:.2} MB)",
            header.dt_size(),
            megabytes(header.dt_size())
        );
    }

    println!("\n* load addresses:");
    println!("  kernel:       {:#010x}", header.kernel_addr);
    println!("  ramdisk:      {:#010x}", header.ramdisk_addr);
    if header.second_size() != 0 {
        println!("  second stage: {:#010x}", header.second_addr);
    }
    println!("  tags:         {:#010x}\n", header.tags_addr);

    let cmdline = header.cmdline();
    if cmdline.is_empty() {
        println!("* empty cmdline");
    } else {
        println!("* cmdline = {}\n", cmdline);
    }
    let extra_cmdline = header.extra_cmdline();
    if extra_cmdline.is_empty() {
        println!("* empty extra cmdline");
    } else {
        println!("* extra cmdline = {}\n", extra_cmdline);
    }

    let id = header
        .id
        .iter()
        .map(|word| format!("{:#010x}", word))
        .collect::<Vec<_>>()
        .join(" ");
    println!("* id = {}\n", id);
}

fn extract(image_path: &Path, config_path: Option<&Path>, outputs: [Option<&Path>; 4]) {
    let path = get_existing_image_path(image_path);

    println!(
        "{} {}reading {}…",
        style("[1/2]").bold().black(),
        Emoji("🔍 ", ""),
        style(path.display()).blue()
    );
    let (image, mut container) = open_image(&path);

    println!(
        "{} {}extracting sections…",
        style("[2/2]").bold().black(),
        Emoji("🚚 ", "")
    );
    let config_path = get_output_path(config_path, None);
    std::fs::write(&config_path, config::render(&image))
        .unwrap_or_else(|e| fail(&format!("couldn't write {}", config_path.display()), e));
    println!(
        "      {}writing boot image config in {}",
        Emoji("📃 ", ""),
        style(config_path.display()).blue()
    );

    for (kind, output) in SectionKind::ALL.into_iter().zip(outputs) {
        let bytes = match image.extract(&mut container, kind) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => continue,
            Err(e) => fail(&format!("couldn't read {}", kind), e),
        };
        let output = get_output_path(output, Some(kind));
        std::fs::write(&output, &bytes).unwrap_or_else(|e| fail(&format!("couldn't write {}", output.display()), e));
        println!(
            "      {}extracted {} in {} ({} bytes)",
            Emoji("📃 ", ""),
            kind,
            style(output.display()).blue(),
            style(bytes.len()).magenta()
        );
    }

    println!("     {} {}", Emoji("✨ ", ""), style("done!").green());
}

fn update(image_path: &Path, edit_args: &EditArgs) {
    let path = get_existing_image_path(image_path);
    let edits = get_edits(edit_args.config.as_deref(), &edit_args.entries);
    let replacements = get_replacements(edit_args.sources());

    println!(
        "{} {}reading {}…",
        style("[1/3]").bold().black(),
        Emoji("🔍 ", ""),
        style(path.display()).blue()
    );
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&path)
        .unwrap_or_else(|e| fail(&format!("couldn't open {}", path.display()), e));
    let target = device::query(&mut file).unwrap_or_else(|e| fail("couldn't get image size", e));
    let mut container = ContainerReader::new(file, target);
    let mut image = BootImage::read_from(&mut container).unwrap_or_else(|e| fail("invalid boot image", e));

    println!(
        "{} {}updating header and sections…",
        style("[2/3]").bold().black(),
        Emoji("📃 ", "")
    );
    image
        .apply_edits(&edits)
        .unwrap_or_else(|e| fail("couldn't update header", e));
    image
        .update_sections(replacements, &mut container)
        .unwrap_or_else(|e| fail("couldn't update sections", e));

    let mut file = container.into_inner();
    write(&mut image, &mut file, &path, "[3/3]");
}

fn create(image_path: &Path, edit_args: &EditArgs) {
    let path = get_image_path(image_path);
    if edit_args.kernel.is_none() || edit_args.ramdisk.is_none() {
        fail("missing sections", "a new boot image needs a kernel (-k) and a ramdisk (-r)");
    }
    let edits = get_edits(edit_args.config.as_deref(), &edit_args.entries);
    let replacements = get_replacements(edit_args.sources());

    println!(
        "{} {}checking {}…",
        style("[1/3]").bold().black(),
        Emoji("🔍 ", ""),
        style(path.display()).blue()
    );
    let mut image = match device::probe(&path) {
        Ok(Some(target)) => BootImage::with_target(target),
        Ok(None) => BootImage::new(),
        Err(e) => fail(&format!("couldn't check {}", path.display()), e),
    };

    println!(
        "{} {}loading header and sections…",
        style("[2/3]").bold().black(),
        Emoji("📃 ", "")
    );
    image
        .apply_edits(&edits)
        .unwrap_or_else(|e| fail("couldn't set header", e));
    image
        .load_sections(replacements)
        .unwrap_or_else(|e| fail("couldn't load sections", e));
    image
        .validate()
        .unwrap_or_else(|e| fail(&format!("{}: sanity checks failed", path.display()), e));

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(!image.is_block_device())
        .open(&path)
        .unwrap_or_else(|e| fail(&format!("couldn't create {}", path.display()), e));
    write(&mut image, &mut file, &path, "[3/3]");
}

fn write<W: Sink>(image: &mut BootImage, target: &mut W, path: &Path, step: &str) {
    let total = image
        .sections()
        .iter()
        .map(|(_, bytes)| bytes.len() as u64)
        .sum::<u64>();
    println!(
        "{} {}writing {}…",
        style(step).bold().black(),
        Emoji("🚚 ", ""),
        style(path.display()).blue()
    );

    let bar_progress = ProgressBar::new(total).with_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {elapsed_precise} [{wide_bar:.green}] {bytes}/{total_bytes}\n{spinner:.green} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar_progress.enable_steady_tick(Duration::from_millis(12));
    let result = image.write_to(target, |kind, len| {
        bar_progress.inc(len);
        bar_progress.set_message(format!("{}", style(kind).blue()));
    });
    bar_progress.finish_and_clear();
    result.unwrap_or_else(|e| fail(&format!("couldn't write {}", path.display()), e));

    println!(
        "      {}{} {} {}",
        Emoji("✨ ", ""),
        style("wrote").green(),
        style(image.size().unwrap_or(0)).magenta(),
        style("bytes").green()
    );
    println!("     {} {}", Emoji("✨ ", ""), style("done!").green());
}
