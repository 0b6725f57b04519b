use anyhow::anyhow;
use clap::Parser;
use docfs::cli_interface::DocFsCli;
/// a CLI interface to users to choose create a store image,
/// or register it to `FUSE` and mount it.
///
/// The latter will block the program until we umount our filesystem ourselves,
///
/// or specify `--auto-unmount` when mounting this fs.
fn main() -> anyhow::Result<()> {
    env_logger::builder().format_timestamp_nanos().init();
    if users::get_effective_uid() == 0 {
        return Err(anyhow!(
            "running as root is not allowed because it may open security holes"
        ));
    }
    let args = DocFsCli::parse();
    match args {
        //if it is a `mkfs` subcommand
        DocFsCli::Mkfs(args) => {
            docfs::mkfs::mkfs(args.image_file_path, args.block_size, args.max_blocks)?;
        }
        DocFsCli::Mount(args) => {
            //if it is a `mount` subcommand
            //register a filesystem to `FUSE` and mount it
            docfs::mount::mount(args.image_file_path, args.mount_point, args.auto_unmount)?;
        }
    }
    Ok(())
}
