use crate::context::AppContext;
use anyhow::Result;

pub async fn grant(ctx: &AppContext) -> Result<()> {
    ctx.manager.persistence().set_consent(true).await?;
    // Whatever was restored from the session copy is written right away.
    let workspace_id = ctx.manager.workspace_id().await;
    ctx.manager.persistence().flush(&workspace_id).await;
    println!("storage allowed");
    Ok(())
}

pub async fn revoke(ctx: &AppContext) -> Result<()> {
    ctx.manager.persistence().set_consent(false).await?;
    println!("storage disallowed; saved graphs are kept but no longer updated");
    Ok(())
}

pub async fn status(ctx: &AppContext) -> Result<()> {
    let persistence = ctx.manager.persistence();
    let status = if persistence.needs_consent().await {
        "not asked"
    } else if persistence.has_consent().await {
        "allowed"
    } else {
        "denied"
    };
    println!("storage: {}", status);
    println!("data:    {}", ctx.paths.data_dir().display());
    println!("config:  {}", ctx.paths.config_file().display());
    println!("model:   {} ({})", ctx.config.model.model, ctx.config.model.base_url);
    Ok(())
}
