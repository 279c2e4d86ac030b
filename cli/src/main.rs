use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use catalog_console::net::types::{CategoryInput, ImageUpload, ProductInput};
use catalog_console::state::auth::NoopNavigator;
use catalog_console::state::resource::{Resource, ResourceContext};
use catalog_console::state::storage::FileStorage;
use catalog_console::util::guard::GuardDecision;
use catalog_console::util::routes;
use catalog_console::{ConsoleApp, ConsoleConfig, ConsoleError, ErrorCode};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("no state directory; set CATALOG_STATE_DIR or HOME")]
    MissingStateDir,
    #[error("not signed in; run `catalog-cli login <email>` first")]
    NotSignedIn,
    #[error("access to {0} requires a role this account does not hold")]
    Forbidden(String),
    #[error("unknown console route: {0}")]
    UnknownRoute(String),
    #[error("{message} ({code})")]
    Console { code: &'static str, message: String },
    #[error("failed to read {path}: {source}")]
    ReadImage { path: PathBuf, source: std::io::Error },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl From<ConsoleError> for CliError {
    fn from(err: ConsoleError) -> Self {
        Self::Console { code: err.error_code(), message: err.to_string() }
    }
}

#[derive(Parser, Debug)]
#[command(name = "catalog-cli", about = "Catalog admin console CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        email: String,
        #[arg(long, env = "CATALOG_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Register {
        name: String,
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm: String,
    },
    Logout,
    Whoami,
    Dashboard,
    Categories(CategoriesCommand),
    Products(ProductsCommand),
}

#[derive(Args, Debug)]
struct CategoriesCommand {
    #[command(subcommand)]
    command: CategoriesSubcommand,
}

#[derive(Subcommand, Debug)]
enum CategoriesSubcommand {
    List,
    Create(CategoryArgs),
    Update {
        id: u64,
        #[command(flatten)]
        fields: CategoryArgs,
    },
    Delete {
        id: u64,
    },
}

#[derive(Args, Debug)]
struct CategoryArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    parent_id: Option<u64>,
}

#[derive(Args, Debug)]
struct ProductsCommand {
    #[command(subcommand)]
    command: ProductsSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProductsSubcommand {
    List,
    Show {
        id: u64,
    },
    Create(ProductArgs),
    Update {
        id: u64,
        #[command(flatten)]
        fields: ProductArgs,
    },
    Delete {
        id: u64,
    },
    DeleteImage {
        product_id: u64,
        image_id: u64,
    },
    SetPrimary {
        product_id: u64,
        image_id: u64,
    },
}

#[derive(Args, Debug)]
struct ProductArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    price: Option<String>,
    #[arg(long)]
    stock: Option<i64>,
    #[arg(long)]
    category_id: Option<u64>,
    #[arg(long = "image", help = "Image file to upload; repeat for several")]
    images: Vec<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConsoleConfig::from_env()?;
    let state_dir = config.state_dir.clone().ok_or(CliError::MissingStateDir)?;
    let storage = FileStorage::in_dir(&state_dir)?;
    tracing::debug!(base_url = %config.api_base_url, storage = %storage.path().display(), "console configured");
    let app = ConsoleApp::from_config(&config, Rc::new(storage), Rc::new(NoopNavigator))?;
    app.start();

    match cli.command {
        Command::Login { email, password } => {
            let identity = app.controller.login(&email, &password).await?;
            print_json(&identity)
        }
        Command::Register { name, email, password, confirm } => {
            let identity = app.controller.register(&name, &email, &password, &confirm).await?;
            print_json(&identity)
        }
        Command::Logout => {
            app.controller.logout().await;
            println!("logged out");
            Ok(())
        }
        Command::Whoami => match app.controller.identity() {
            Some(identity) => print_json(&identity),
            None => Err(CliError::NotSignedIn),
        },
        Command::Dashboard => {
            require(&app, routes::ADMIN_DASHBOARD).await?;
            let stats = slice_result(&*app.dashboard, app.dashboard.fetch().await)?;
            print_json(&stats)
        }
        Command::Categories(categories) => run_categories(&app, categories).await,
        Command::Products(products) => run_products(&app, products).await,
    }
}

async fn run_categories(app: &ConsoleApp, categories: CategoriesCommand) -> Result<(), CliError> {
    require(app, routes::ADMIN_CATEGORIES).await?;
    let ctx = &*app.categories;
    let list = match categories.command {
        CategoriesSubcommand::List => ctx.fetch().await,
        CategoriesSubcommand::Create(fields) => ctx.create(&fields.into_input()).await,
        CategoriesSubcommand::Update { id, fields } => ctx.update(id, &fields.into_input()).await,
        CategoriesSubcommand::Delete { id } => ctx.delete(id).await,
    };
    print_json(&slice_result(ctx, list)?)
}

async fn run_products(app: &ConsoleApp, products: ProductsCommand) -> Result<(), CliError> {
    require(app, routes::ADMIN_PRODUCTS).await?;
    let ctx = &*app.products;
    match products.command {
        ProductsSubcommand::List => {
            let list = slice_result(ctx, ctx.fetch().await)?;
            print_json(&list)
        }
        ProductsSubcommand::Show { id } => {
            let product = slice_result(ctx, ctx.fetch_product(id).await)?;
            print_json(&product)
        }
        ProductsSubcommand::Create(fields) => {
            let product = slice_result(ctx, ctx.create(&fields.into_input()?).await)?;
            print_json(&product)
        }
        ProductsSubcommand::Update { id, fields } => {
            let product = slice_result(ctx, ctx.update(id, &fields.into_input()?).await)?;
            print_json(&product)
        }
        ProductsSubcommand::Delete { id } => {
            slice_result(ctx, ctx.delete(id).await)?;
            println!("deleted product {id}");
            Ok(())
        }
        ProductsSubcommand::DeleteImage { product_id, image_id } => {
            slice_result(ctx, ctx.delete_image(product_id, image_id).await)?;
            println!("deleted image {image_id} of product {product_id}");
            Ok(())
        }
        ProductsSubcommand::SetPrimary { product_id, image_id } => {
            slice_result(ctx, ctx.set_primary_image(product_id, image_id).await)?;
            println!("image {image_id} is now primary for product {product_id}");
            Ok(())
        }
    }
}

/// Run the console route guard for `route` before touching its resources.
async fn require(app: &ConsoleApp, route: &str) -> Result<(), CliError> {
    match app.settle(route).await {
        GuardDecision::Render => Ok(()),
        GuardDecision::Forbidden => Err(CliError::Forbidden(route.to_owned())),
        GuardDecision::Redirect { .. } | GuardDecision::Loading => Err(CliError::NotSignedIn),
        GuardDecision::NotFound => Err(CliError::UnknownRoute(route.to_owned())),
    }
}

/// Report failures with the message the console would show in its error panel.
fn slice_result<R: Resource, T>(ctx: &ResourceContext<R>, result: Result<T, ConsoleError>) -> Result<T, CliError> {
    result.map_err(|err| CliError::Console {
        code: err.error_code(),
        message: ctx.snapshot().error.unwrap_or_else(|| err.to_string()),
    })
}

impl CategoryArgs {
    fn into_input(self) -> CategoryInput {
        CategoryInput { name: self.name, description: self.description, parent_id: self.parent_id }
    }
}

impl ProductArgs {
    fn into_input(self) -> Result<ProductInput, CliError> {
        let images = self.images.iter().map(|path| read_image(path)).collect::<Result<Vec<_>, _>>()?;
        Ok(ProductInput {
            name: self.name,
            description: self.description,
            price: self.price,
            stock: self.stock,
            category_id: self.category_id,
            images,
        })
    }
}

fn read_image(path: &Path) -> Result<ImageUpload, CliError> {
    let bytes = std::fs::read(path).map_err(|source| CliError::ReadImage { path: path.to_owned(), source })?;
    let file_name = path.file_name().map_or_else(|| "image".to_owned(), |n| n.to_string_lossy().into_owned());
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    let content_type = match extension.as_deref() {
        Some("png") => Some("image/png"),
        Some("jpg" | "jpeg") => Some("image/jpeg"),
        Some("gif") => Some("image/gif"),
        Some("webp") => Some("image/webp"),
        _ => None,
    };
    Ok(ImageUpload { file_name, content_type: content_type.map(str::to_owned), bytes })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
