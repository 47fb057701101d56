// src/actions/submit.rs

//! `submit` and `makeup`.

use tracing::info;

use super::{ActionContext, Modifiers, Target};
use crate::catalog::{DatasetRegistrar, project_name};
use crate::errors::{GridstageError, Result};
use crate::makeup::MakeupPlanner;
use crate::reconcile::artifacts::BookkeepingWriter;
use crate::submit::{
    SubmissionBuilder, SubmissionDriver, SubmissionLock, SubmissionOptions, TimeoutPolicy,
};

pub async fn submit(
    ctx: &ActionContext,
    t: Target<'_>,
    mods: &Modifiers,
    makeup: bool,
) -> Result<usize> {
    let stage = t.stage;
    let layout = &stage.layout;
    let fs = ctx.fs.as_ref();
    let _lock = if mods.dryrun {
        None
    } else {
        Some(SubmissionLock::acquire(&t.model.config.lock_dir, &t.project.name, stage)?)
    };

    if !makeup {
        if stage.pubs_output() && !stage.dynamic {
            layout.clean(fs, ctx.caller)?;
        }
        layout.make_dirs(fs)?;
    }
    layout.check_dirs(fs)?;

    let recur = mods.recur || stage.recursion.enabled;
    if !makeup && !recur && !stage.dynamic {
        if let Some(dir) = layout.first_non_empty(fs)? {
            return Err(GridstageError::Structural {
                path: dir,
                reason: "directory is not empty, run the clean action first".to_string(),
            });
        }
    }

    let plan = if makeup {
        let plan = MakeupPlanner::new(fs, ctx.caller)
            .plan(stage, Some(ctx.catalog.as_ref()), &ctx.user)
            .await?;
        if plan.is_empty() {
            println!("Makeup action aborted because makeup job count is zero.");
            return Ok(0);
        }
        Some(plan)
    } else {
        None
    };

    let mut input_def = None;
    if recur && !makeup {
        if let Some((def, _)) = DatasetRegistrar::new(ctx.catalog.as_ref())
            .ensure_recursive(t.project, stage, &ctx.user)
            .await?
        {
            input_def = Some(def.name);
        }
    }

    let builder = SubmissionBuilder::new(fs, t.project, stage);
    let mut opts = SubmissionOptions {
        makeup: plan.as_ref(),
        recur,
        input_def,
        sam_project: None,
        prestarted: false,
    };
    if let Some(defname) = builder.input_defname(&opts) {
        let prj = project_name(&ctx.user, &defname);
        if stage.prestart && !mods.dryrun {
            println!("Starting sam project {prj}");
            ctx.catalog.start_project(&defname, &prj).await?;
            opts.prestarted = true;
        }
        opts.sam_project = Some(prj);
    }
    let request = builder.build(&opts)?;

    if mods.dryrun {
        println!("Dry run: {}", request.command);
        if let Some(dag) = request.dag_text() {
            println!("{dag}");
        }
        return Ok(0);
    }

    request.stage_files(fs)?;
    let driver = SubmissionDriver::new(ctx.backend.as_ref(), TimeoutPolicy::from_config(&t.model.config));
    let job_id = driver
        .submit(request.command.clone(), request.job_count, stage.jobsub_timeout_secs)
        .await?;

    let writer = BookkeepingWriter::new(fs, &layout.bookdir);
    writer.append_job_id(&job_id)?;
    writer.clear_checked()?;
    println!("Job id: {job_id}");
    info!(
        stage = %stage.name,
        job_id = %job_id,
        jobs = request.job_count,
        makeup,
        "stage submitted"
    );
    Ok(0)
}
